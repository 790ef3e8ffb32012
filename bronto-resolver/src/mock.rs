use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::prelude::{ResolveError, Resolver};
use bronto_proto::packet::{DnsPacket, QueryType};

/// In-memory resolver for tests; responds from a fixed table and counts
/// how often it was asked.
#[derive(Debug)]
pub struct MockResolver {
    identifier: String,
    responses: HashMap<(&'static str, QueryType), DnsPacket>,
    failing: bool,
    calls: AtomicUsize,
}

impl MockResolver {
    pub fn new<I: Into<String>>(identifier: I) -> Self {
        Self {
            identifier: identifier.into(),
            responses: Default::default(),
            failing: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// A resolver where every exchange fails.
    pub fn failing<I: Into<String>>(identifier: I) -> Self {
        Self {
            failing: true,
            ..Self::new(identifier)
        }
    }

    pub fn with_response(
        mut self,
        qname: &'static str,
        qtype: QueryType,
        packet: DnsPacket,
    ) -> Self {
        self.responses.insert((qname, qtype), packet);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl std::fmt::Display for MockResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mock://{}", self.identifier)
    }
}

#[async_trait::async_trait]
impl Resolver for MockResolver {
    async fn resolve(&self, query: &DnsPacket) -> Result<DnsPacket, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(ResolveError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "mock resolver configured to fail",
            )));
        }
        let question = query.questions.first().ok_or_else(|| {
            ResolveError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "query without question",
            ))
        })?;
        match self
            .responses
            .get(&(question.name.as_str(), question.qtype))
        {
            Some(found) => {
                let mut response = found.clone();
                response.header.id = query.header.id;
                Ok(response)
            }
            None => Err(ResolveError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no mock response registered",
            ))),
        }
    }
}
