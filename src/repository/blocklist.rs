use bronto_proto::name::split_name;
use bronto_proto::packet::QueryType;
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// `domain[:QTYPE]` lines, blocked for any qtype by default.
    Domains,
    /// Domain lines blocked for AAAA queries only.
    DomainsAaaa,
    /// `/etc/hosts` format lines.
    Hosts,
}

impl Default for SourceKind {
    fn default() -> Self {
        Self::Domains
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Source {
    pub location: String,
    #[serde(default)]
    pub kind: SourceKind,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct Config {
    /// Inline block entries, `domain[:QTYPE]`.
    #[serde(default)]
    pub entries: Vec<String>,
    /// Blocklist sources fetched from a path or URL.
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Names whose subtrees are removed after all sources are loaded.
    #[serde(default)]
    pub deletes: Vec<String>,
    /// Rebuild the blocklist periodically.
    #[serde(default)]
    pub refresh: bool,
    /// Seconds between rebuilds.
    #[serde(default = "Config::default_refresh_interval")]
    pub refresh_interval: u64,
}

impl Config {
    pub fn default_refresh_interval() -> u64 {
        86_400
    }
}

/// One rule attached to a trie node.
///
/// `Prefix` shapes match the node's whole subtree, `Exact` shapes only the
/// node itself; the qtype-qualified variants additionally require the
/// query type to match. Equality is structural and rules are kept sorted
/// by priority for deterministic evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRule {
    Prefix,
    PrefixQtype(QueryType),
    Exact,
    ExactQtype(QueryType),
}

impl BlockRule {
    /// Rule for a textual entry: names block their whole subtree.
    pub fn for_qtype(qtype: QueryType) -> Self {
        if qtype == QueryType::ANY {
            Self::Prefix
        } else {
            Self::PrefixQtype(qtype)
        }
    }

    fn priority(&self) -> u8 {
        match self {
            Self::Prefix => 0,
            Self::Exact => 1,
            Self::PrefixQtype(_) => 2,
            Self::ExactQtype(_) => 3,
        }
    }

    fn matches(&self, remaining: usize, qtype: QueryType) -> bool {
        match self {
            Self::Prefix => true,
            Self::PrefixQtype(expected) => *expected == qtype,
            Self::Exact => remaining == 0,
            Self::ExactQtype(expected) => remaining == 0 && *expected == qtype,
        }
    }
}

impl std::fmt::Display for BlockRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prefix => write!(f, "prefix:ANY"),
            Self::PrefixQtype(qtype) => write!(f, "prefix:{qtype}"),
            Self::Exact => write!(f, "exact:ANY"),
            Self::ExactQtype(qtype) => write!(f, "exact:{qtype}"),
        }
    }
}

#[derive(Debug, Default)]
struct Node {
    rules: Vec<BlockRule>,
    children: BTreeMap<String, Node>,
}

impl Node {
    fn add(&mut self, labels: &[String], rule: BlockRule) {
        match labels.split_last() {
            None => {
                // Terminal node; deduplicate and keep priority order.
                if !self.rules.contains(&rule) {
                    self.rules.push(rule);
                    self.rules.sort_by_key(BlockRule::priority);
                }
            }
            Some((next, rest)) => {
                self.children.entry(next.clone()).or_default().add(rest, rule);
            }
        }
    }

    fn matches(&self, labels: &[String], qtype: QueryType) -> bool {
        if self
            .rules
            .iter()
            .any(|rule| rule.matches(labels.len(), qtype))
        {
            return true;
        }
        match labels.split_last() {
            None => false,
            Some((next, rest)) => match self.children.get(next) {
                Some(child) => child.matches(rest, qtype),
                None => false,
            },
        }
    }

    fn delete(&mut self, labels: &[String], rule: &BlockRule) -> bool {
        match labels.split_last() {
            None => {
                let before = self.rules.len();
                self.rules.retain(|found| found != rule);
                self.rules.len() != before
            }
            Some((next, rest)) => match self.children.get_mut(next) {
                Some(child) => child.delete(rest, rule),
                None => false,
            },
        }
    }

    fn delete_subtree(&mut self, labels: &[String]) -> bool {
        match labels.split_last() {
            None => false,
            Some((next, rest)) => {
                if rest.is_empty() {
                    self.children.remove(next).is_some()
                } else {
                    match self.children.get_mut(next) {
                        Some(child) => child.delete_subtree(rest),
                        None => false,
                    }
                }
            }
        }
    }

    fn count(&self) -> usize {
        self.rules.len() + self.children.values().map(Node::count).sum::<usize>()
    }

    fn walk(&self, name: &str, visit: &mut dyn FnMut(&str, &[BlockRule])) {
        if !self.rules.is_empty() {
            visit(name, &self.rules);
        }
        for (label, child) in &self.children {
            let child_name = if name == "." {
                format!("{label}.")
            } else {
                format!("{label}.{name}")
            };
            child.walk(&child_name, visit);
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum EntryError {
    InvalidEntry(String),
    InvalidQtype(String),
}

impl std::fmt::Display for EntryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEntry(entry) => write!(f, "invalid blocklist entry {entry:?}"),
            Self::InvalidQtype(qtype) => write!(f, "invalid qtype {qtype:?}"),
        }
    }
}

impl std::error::Error for EntryError {}

/// Reverse-label trie of block rules. The match walks labels from the TLD
/// inwards, evaluating every rule on the path.
#[derive(Debug, Default)]
pub struct BlockList {
    root: RwLock<Node>,
}

impl BlockList {
    /// Attach `rule` at the node for `name`, creating the path as needed.
    pub fn add(&self, name: &str, rule: BlockRule) {
        let labels = split_name(name);
        self.root.write().expect("blocklist lock").add(&labels, rule);
    }

    /// Add a textual entry, `domain[:QTYPE]`. Entries without a qtype use
    /// `default_qtype`.
    pub fn add_entry(&self, entry: &str, default_qtype: QueryType) -> Result<(), EntryError> {
        let parts: Vec<&str> = entry.split(':').collect();
        match parts.as_slice() {
            [name] => {
                self.add(name, BlockRule::for_qtype(default_qtype));
                Ok(())
            }
            [name, qtype] => match QueryType::from_name(qtype) {
                Some(qtype) => {
                    self.add(name, BlockRule::for_qtype(qtype));
                    Ok(())
                }
                None => Err(EntryError::InvalidQtype(qtype.to_string())),
            },
            _ => Err(EntryError::InvalidEntry(entry.to_string())),
        }
    }

    /// Add a line in `/etc/hosts` format. Only `0.0.0.0` targets are
    /// blocked; blank lines and comments are ignored.
    pub fn add_hosts_entry(&self, line: &str) -> Result<(), EntryError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }
        let mut tokens = line.split_whitespace();
        let (ip, domain) = match (tokens.next(), tokens.next()) {
            (Some(ip), Some(domain)) => (ip, domain),
            _ => return Err(EntryError::InvalidEntry(line.to_string())),
        };
        if ip != "0.0.0.0" || domain == "0.0.0.0" {
            return Ok(());
        }
        self.add_entry(domain, QueryType::ANY)
    }

    pub fn matches(&self, qname: &str, qtype: QueryType) -> bool {
        let labels = split_name(qname);
        self.root
            .read()
            .expect("blocklist lock")
            .matches(&labels, qtype)
    }

    /// Remove one rule from the node for `qname`; true if it was there.
    pub fn delete(&self, qname: &str, rule: &BlockRule) -> bool {
        let labels = split_name(qname);
        self.root
            .write()
            .expect("blocklist lock")
            .delete(&labels, rule)
    }

    /// Remove the whole subtree rooted at `qname`; true if the branch
    /// existed.
    pub fn delete_subtree(&self, qname: &str) -> bool {
        let labels = split_name(qname);
        self.root
            .write()
            .expect("blocklist lock")
            .delete_subtree(&labels)
    }

    /// Number of rules, not nodes.
    pub fn count(&self) -> usize {
        self.root.read().expect("blocklist lock").count()
    }

    /// Visit every node carrying rules, children in sorted-label order.
    pub fn walk(&self, mut visit: impl FnMut(&str, &[BlockRule])) {
        self.root
            .read()
            .expect("blocklist lock")
            .walk(".", &mut visit);
    }

    /// Swap in a freshly built blocklist; in-flight matches see either the
    /// old or the new trie.
    pub fn replace(&self, other: BlockList) {
        let root = other.root.into_inner().expect("blocklist lock");
        *self.root.write().expect("blocklist lock") = root;
    }
}
