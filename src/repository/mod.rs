pub(crate) mod blocklist;
pub(crate) mod cache;
pub(crate) mod stats;
pub(crate) mod upstream;
