use sha2::{Digest, Sha256};

/// How the lines of a source should be interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum BlocklistKind {
    /// `domain[:QTYPE]`, one per line.
    Domains,
    /// `/etc/hosts` format, `0.0.0.0 domain` entries only.
    EtcHosts,
}

#[derive(Debug)]
pub enum LoadError {
    Http(reqwest::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(error) => write!(f, "unable to fetch source: {error}"),
            Self::Io(error) => write!(f, "unable to read source: {error}"),
        }
    }
}

impl std::error::Error for LoadError {}

fn hash(input: &str) -> String {
    let result = Sha256::new().chain_update(input).finalize();
    base16ct::lower::encode_string(&result)
}

/// The fetched content of one blocklist source.
#[derive(Debug)]
pub struct Blocklist {
    pub kind: BlocklistKind,
    /// Fingerprint of the raw content, used to skip rebuilds when nothing
    /// changed.
    pub hash: String,
    /// Non-blank, non-comment lines.
    pub entries: Vec<String>,
}

impl Blocklist {
    pub fn from_content(content: &str, kind: BlocklistKind) -> Self {
        let hash = hash(content);
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect();

        Self {
            kind,
            hash,
            entries,
        }
    }
}

#[derive(Debug, Default)]
pub struct BlocklistLoader;

impl BlocklistLoader {
    /// Load a source by filesystem path or HTTP(S) URL.
    pub async fn load(&self, location: &str, kind: BlocklistKind) -> Result<Blocklist, LoadError> {
        tracing::debug!("loading {location:?}");
        let content = if location.starts_with("http://") || location.starts_with("https://") {
            let response = reqwest::get(location).await.map_err(LoadError::Http)?;
            response
                .error_for_status()
                .map_err(LoadError::Http)?
                .text()
                .await
                .map_err(LoadError::Http)?
        } else {
            tokio::fs::read_to_string(location)
                .await
                .map_err(LoadError::Io)?
        };
        Ok(Blocklist::from_content(&content, kind))
    }
}
