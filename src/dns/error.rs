use ipnet::PrefixLenError;
use std::fmt::Display;

/// Configuration problems that stop the dns command from starting.
#[derive(Debug)]
pub enum SetupError {
    ListenAddress(String),
    Dns64Prefix(PrefixLenError),
}

impl Display for SetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ListenAddress(value) => write!(f, "invalid listen address {value:?}"),
            Self::Dns64Prefix(error) => write!(f, "invalid dns64 prefix: {error}"),
        }
    }
}

impl std::error::Error for SetupError {}
