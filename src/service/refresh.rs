use crate::repository::blocklist::{BlockList, Config, EntryError, SourceKind};
use bronto_blocklist_loader::{BlocklistKind, BlocklistLoader, LoadError};
use bronto_proto::packet::QueryType;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug)]
pub enum BuildError {
    Entry(EntryError),
    Load(LoadError),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Entry(error) => write!(f, "{error}"),
            Self::Load(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for BuildError {}

impl From<EntryError> for BuildError {
    fn from(value: EntryError) -> Self {
        Self::Entry(value)
    }
}

impl From<LoadError> for BuildError {
    fn from(value: LoadError) -> Self {
        Self::Load(value)
    }
}

/// A freshly built blocklist plus the fingerprint of the sources that went
/// into it.
pub struct BuiltBlocklist {
    pub blocklist: BlockList,
    pub fingerprint: Vec<String>,
}

fn loader_kind(kind: SourceKind) -> BlocklistKind {
    match kind {
        SourceKind::Hosts => BlocklistKind::EtcHosts,
        _ => BlocklistKind::Domains,
    }
}

/// Build a blocklist from the configured sources: inline entries first,
/// then domain lists, AAAA lists and hosts files, with deletions applied
/// last.
pub async fn build(config: &Config) -> Result<BuiltBlocklist, BuildError> {
    let blocklist = BlockList::default();
    let loader = BlocklistLoader;
    let mut fingerprint = Vec::new();

    for entry in &config.entries {
        blocklist.add_entry(entry, QueryType::ANY)?;
    }

    for kind in [SourceKind::Domains, SourceKind::DomainsAaaa, SourceKind::Hosts] {
        for source in config.sources.iter().filter(|source| source.kind == kind) {
            let loaded = loader.load(&source.location, loader_kind(kind)).await?;
            tracing::debug!(
                "loaded {:?} with {} entries, hash {}",
                source.location,
                loaded.entries.len(),
                loaded.hash
            );
            fingerprint.push(loaded.hash);
            for line in &loaded.entries {
                match kind {
                    SourceKind::Domains => blocklist.add_entry(line, QueryType::ANY)?,
                    SourceKind::DomainsAaaa => blocklist.add_entry(line, QueryType::AAAA)?,
                    SourceKind::Hosts => blocklist.add_hosts_entry(line)?,
                }
            }
        }
    }

    for name in &config.deletes {
        blocklist.delete_subtree(name);
    }

    Ok(BuiltBlocklist {
        blocklist,
        fingerprint,
    })
}

/// Periodically rebuild the blocklist from its sources and swap it in.
/// A failed rebuild keeps the live trie; unchanged sources skip the swap.
pub async fn run(
    live: Arc<BlockList>,
    config: Config,
    mut fingerprint: Vec<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut timer = tokio::time::interval(Duration::from_secs(config.refresh_interval));
    timer.tick().await;

    loop {
        tokio::select! {
            _ = timer.tick() => match build(&config).await {
                Ok(built) => {
                    if built.fingerprint == fingerprint {
                        tracing::debug!("blocklist sources unchanged");
                        continue;
                    }
                    fingerprint = built.fingerprint;
                    let count = built.blocklist.count();
                    live.replace(built.blocklist);
                    tracing::info!("updated blocklist: {count} rules");
                }
                Err(error) => tracing::warn!("unable to refresh blocklist: {error}"),
            },
            _ = shutdown.changed() => break,
        }
    }
}
