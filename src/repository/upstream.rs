use bronto_proto::packet::DnsPacket;
use bronto_resolver::prelude::Resolver;
use bronto_resolver::EndpointError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

/// Consecutive head-of-list failures tolerated before the head is demoted
/// to the tail.
const DEMOTE_THRESHOLD: u32 = 3;

#[derive(Debug, serde::Deserialize)]
pub struct Config {
    /// Upstream endpoints, tried in order: `udp://ip[:port]`,
    /// `tls://ip[:port]`, `https://…` or a bare address.
    #[serde(default = "Config::default_servers")]
    pub servers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: Self::default_servers(),
        }
    }
}

impl Config {
    pub fn default_servers() -> Vec<String> {
        vec!["1.1.1.1".to_string(), "1.0.0.1".to_string()]
    }

    pub fn build(&self) -> Result<UpstreamPool, EndpointError> {
        let mut resolvers: Vec<Arc<dyn Resolver + Send + Sync>> = Vec::new();
        for endpoint in &self.servers {
            resolvers.push(Arc::from(bronto_resolver::from_endpoint(endpoint)?));
        }
        Ok(UpstreamPool::new(resolvers))
    }
}

#[derive(Debug)]
pub enum UpstreamError {
    NoUpstream,
    AllFailed,
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoUpstream => write!(f, "no upstream resolver configured"),
            Self::AllFailed => write!(f, "all upstream resolvers failed"),
        }
    }
}

impl std::error::Error for UpstreamError {}

/// Ordered list of upstream resolvers with a demotion policy: a head that
/// keeps failing while others work gets rotated to the tail so clients
/// stop paying for its timeouts.
pub struct UpstreamPool {
    resolvers: RwLock<Vec<Arc<dyn Resolver + Send + Sync>>>,
    head_errors: AtomicU32,
}

impl UpstreamPool {
    pub fn new(resolvers: Vec<Arc<dyn Resolver + Send + Sync>>) -> Self {
        Self {
            resolvers: RwLock::new(resolvers),
            head_errors: AtomicU32::new(0),
        }
    }

    /// Current order, by identity; for logs and tests.
    pub fn order(&self) -> Vec<String> {
        self.resolvers
            .read()
            .expect("upstream lock")
            .iter()
            .map(|resolver| resolver.to_string())
            .collect()
    }

    pub fn head_errors(&self) -> u32 {
        self.head_errors.load(Ordering::SeqCst)
    }

    /// Try each resolver in order; the first success wins. Concurrent
    /// queries may observe an intermediate order while a demotion is in
    /// flight.
    pub async fn resolve(&self, query: &DnsPacket) -> Result<DnsPacket, UpstreamError> {
        let snapshot = self.resolvers.read().expect("upstream lock").clone();
        if snapshot.is_empty() {
            return Err(UpstreamError::NoUpstream);
        }

        for (index, resolver) in snapshot.iter().enumerate() {
            match resolver.resolve(query).await {
                Ok(response) => {
                    if index == 0 {
                        self.head_errors.store(0, Ordering::SeqCst);
                    }
                    return Ok(response);
                }
                Err(error) => {
                    tracing::warn!("upstream error <{resolver}>: {error}");
                    if index == 0 {
                        let count = self.head_errors.fetch_add(1, Ordering::SeqCst) + 1;
                        if count > DEMOTE_THRESHOLD {
                            self.demote();
                        }
                    }
                }
            }
        }

        Err(UpstreamError::AllFailed)
    }

    fn demote(&self) {
        let mut resolvers = self.resolvers.write().expect("upstream lock");
        if resolvers.len() > 1 {
            let head = resolvers.remove(0);
            resolvers.push(head);
        }
        self.head_errors.store(0, Ordering::SeqCst);
        tracing::info!(
            "error threshold exceeded, demoting upstream: {:?}",
            resolvers
                .iter()
                .map(|resolver| resolver.to_string())
                .collect::<Vec<_>>()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{UpstreamError, UpstreamPool};
    use bronto_proto::packet::header::Header;
    use bronto_proto::packet::question::Question;
    use bronto_proto::packet::record::Record;
    use bronto_proto::packet::{DnsPacket, QueryType};
    use bronto_resolver::mock::MockResolver;
    use bronto_resolver::prelude::Resolver;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn query(qname: &'static str) -> DnsPacket {
        DnsPacket::new(Header::question(1)).with_question(Question::new(qname.into(), QueryType::A))
    }

    fn answer(qname: &'static str) -> DnsPacket {
        DnsPacket::new(Header::response(1))
            .with_question(Question::new(qname.into(), QueryType::A))
            .with_answer(Record::A {
                domain: qname.into(),
                addr: Ipv4Addr::new(10, 0, 0, 1),
                ttl: 60,
            })
    }

    fn working(identifier: &str, names: &[&'static str]) -> Arc<dyn Resolver + Send + Sync> {
        let mut resolver = MockResolver::new(identifier);
        for name in names {
            resolver = resolver.with_response(name, QueryType::A, answer(name));
        }
        Arc::new(resolver)
    }

    #[tokio::test]
    async fn should_answer_from_first_resolver() {
        let pool = UpstreamPool::new(vec![
            working("first", &["perdu.com"]),
            working("second", &[]),
        ]);
        let response = pool.resolve(&query("perdu.com")).await.unwrap();
        assert_eq!(response.answers.len(), 1);
        assert_eq!(pool.head_errors(), 0);
    }

    #[tokio::test]
    async fn should_fall_back_to_next_resolver() {
        let pool = UpstreamPool::new(vec![
            Arc::new(MockResolver::failing("broken")),
            working("second", &["perdu.com"]),
        ]);
        let response = pool.resolve(&query("perdu.com")).await.unwrap();
        assert_eq!(response.answers.len(), 1);
        assert_eq!(pool.head_errors(), 1);
    }

    #[tokio::test]
    async fn should_demote_failing_head_after_threshold() {
        let names = ["a.com", "b.com", "c.com", "d.com"];
        let pool = UpstreamPool::new(vec![
            Arc::new(MockResolver::failing("broken")),
            working("second", &names),
        ]);

        for name in names {
            pool.resolve(&query(name)).await.unwrap();
        }

        assert_eq!(
            pool.order(),
            vec!["mock://second".to_string(), "mock://broken".to_string()]
        );
        assert_eq!(pool.head_errors(), 0);
    }

    #[tokio::test]
    async fn should_report_aggregate_failure() {
        let pool = UpstreamPool::new(vec![
            Arc::new(MockResolver::failing("one")),
            Arc::new(MockResolver::failing("two")),
        ]);
        let error = pool.resolve(&query("perdu.com")).await.unwrap_err();
        assert!(matches!(error, UpstreamError::AllFailed));
    }
}
