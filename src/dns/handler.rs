use crate::acl::Acl;
use crate::dns::dns64::Dns64;
use crate::repository::blocklist::BlockList;
use crate::repository::cache::MessageCache;
use crate::repository::stats::{ConnectionLog, StatsHandler};
use crate::repository::upstream::{UpstreamError, UpstreamPool};
use bronto_proto::buffer::BytePacketBuffer;
use bronto_proto::name::canonical_name;
use bronto_proto::packet::header::ResponseCode;
use bronto_proto::packet::record::Record;
use bronto_proto::packet::{DnsPacket, QueryType};
use bronto_server::prelude::Message;
use std::sync::Arc;
use std::time::Instant;

/// The query pipeline: ACL, blocklist, cache, upstream resolution and
/// DNS64 synthesis, with one telemetry record per query.
pub(crate) struct DnsHandler {
    acl: Acl,
    blocklist: Arc<BlockList>,
    cache: Arc<MessageCache>,
    upstreams: Arc<UpstreamPool>,
    stats: Arc<StatsHandler>,
    dns64: Option<Dns64>,
}

impl DnsHandler {
    pub fn new(
        acl: Acl,
        blocklist: Arc<BlockList>,
        cache: Arc<MessageCache>,
        upstreams: Arc<UpstreamPool>,
        stats: Arc<StatsHandler>,
        dns64: Option<Dns64>,
    ) -> Self {
        Self {
            acl,
            blocklist,
            cache,
            upstreams,
            stats,
            dns64,
        }
    }

    /// A locally generated failure response: the rcode plus a TXT record
    /// in the additional section naming the reason, for debugging only.
    fn error_response(request: &DnsPacket, rcode: ResponseCode, reason: &str) -> DnsPacket {
        let mut response = DnsPacket::response_from(request);
        response.header.response_code = rcode;
        response.with_resource(Record::TXT {
            domain: ".".into(),
            text: reason.into(),
            ttl: 0,
        })
    }

    /// Cache lookup, then the upstream pool; upstream answers get cached.
    /// The flag reports whether the answer came from the cache.
    async fn resolve(&self, request: &DnsPacket) -> Result<(DnsPacket, bool), UpstreamError> {
        if let Some(found) = self.cache.get(request) {
            return Ok((found, true));
        }
        let response = self.upstreams.resolve(request).await?;
        self.cache.add_message(&response);
        Ok((response, false))
    }

    fn reply(&self, address: std::net::SocketAddr, mut response: DnsPacket) -> Option<Message> {
        match response.create_buffer() {
            Ok(buffer) => Some(Message {
                address,
                buffer: buffer.as_slice().to_vec(),
            }),
            Err(error) => {
                tracing::warn!("unable to encode response: {error:?}");
                None
            }
        }
    }

    async fn process(&self, message: &Message, log: &mut ConnectionLog) -> Option<Message> {
        let request = match DnsPacket::try_from(BytePacketBuffer::from_bytes(&message.buffer)) {
            Ok(found) => found,
            Err(error) => {
                tracing::debug!("unable to read packet: {error:?}");
                log.error = true;
                return None;
            }
        };

        tracing::Span::current().record("id", request.header.id);

        // A single question only; anything else is dropped without a
        // response.
        if request.questions.len() != 1 {
            tracing::debug!("invalid question count: {}", request.questions.len());
            log.error = true;
            return None;
        }

        let qname = canonical_name(&request.questions[0].name);
        let qtype = request.questions[0].qtype;
        log.qname = qname.clone();
        log.qtype = qtype.to_string();

        if !self.acl.permits(message.address.ip()) {
            tracing::debug!("refused by acl");
            return None;
        }
        log.acl = true;

        if self.blocklist.matches(&qname, qtype) {
            tracing::debug!("blocked");
            log.blocked = true;
            let response =
                Self::error_response(&request, ResponseCode::NameError, "Blocked");
            log.rcode = response.header.response_code.to_num();
            return self.reply(message.address, response);
        }

        let (mut response, mut cached) = match self.resolve(&request).await {
            Ok(found) => found,
            Err(error) => {
                tracing::debug!("upstream failure: {error}");
                log.error = true;
                let response =
                    Self::error_response(&request, ResponseCode::ServerFailure, "Upstream error");
                log.rcode = response.header.response_code.to_num();
                return self.reply(message.address, response);
            }
        };

        // DNS64 is strictly a fallback: a non-empty AAAA answer is never
        // rewritten.
        if let Some(dns64) = &self.dns64 {
            if qtype == QueryType::AAAA
                && response.answers.is_empty()
                && Dns64::eligible(message.address.ip())
            {
                let mut inner = request.clone();
                inner.questions[0].qtype = QueryType::A;
                match self.resolve(&inner).await {
                    Ok((inner_response, inner_cached)) => {
                        response = dns64.synthesize(inner_response);
                        cached = inner_cached;
                    }
                    Err(error) => {
                        tracing::debug!("dns64 upstream failure: {error}");
                        log.error = true;
                        let response = Self::error_response(
                            &request,
                            ResponseCode::ServerFailure,
                            "Upstream error",
                        );
                        log.rcode = response.header.response_code.to_num();
                        return self.reply(message.address, response);
                    }
                }
            }
        }

        log.cached = cached;
        log.rcode = response.header.response_code.to_num();
        self.reply(message.address, response)
    }
}

#[async_trait::async_trait]
impl bronto_server::Handler for DnsHandler {
    #[tracing::instrument(skip_all, fields(origin = ?message.address, id = tracing::field::Empty))]
    async fn handle(&self, message: Message) -> Option<Message> {
        let started = Instant::now();
        let mut log = ConnectionLog::new(message.address);

        let response = self.process(&message, &mut log).await;

        // The record is emitted whatever path the query took.
        log.querytime = started.elapsed();
        self.stats.insert(log);

        response
    }
}

#[cfg(test)]
mod tests {
    use super::DnsHandler;
    use crate::acl::Acl;
    use crate::dns::dns64::Dns64;
    use crate::repository::blocklist::BlockList;
    use crate::repository::cache::MessageCache;
    use crate::repository::stats::StatsHandler;
    use crate::repository::upstream::UpstreamPool;
    use bronto_proto::buffer::BytePacketBuffer;
    use bronto_proto::packet::header::{Header, ResponseCode};
    use bronto_proto::packet::question::Question;
    use bronto_proto::packet::record::Record;
    use bronto_proto::packet::{DnsPacket, QueryType};
    use bronto_resolver::mock::MockResolver;
    use bronto_resolver::prelude::Resolver;
    use bronto_server::{prelude::Message, Handler};
    use similar_asserts::assert_eq;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
    use std::sync::Arc;

    fn socket_address() -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 1, 0, 1), 42))
    }

    fn ipv6_address() -> SocketAddr {
        SocketAddr::new("::1".parse::<IpAddr>().unwrap(), 42)
    }

    fn query(qname: &str, qtype: QueryType) -> DnsPacket {
        DnsPacket::new(Header::question(1)).with_question(Question::new(qname.into(), qtype))
    }

    fn message(address: SocketAddr, packet: &DnsPacket) -> Message {
        let buffer = packet.clone().create_buffer().unwrap();
        Message {
            address,
            buffer: buffer.as_slice().to_vec(),
        }
    }

    fn decode(message: Message) -> DnsPacket {
        DnsPacket::try_from(BytePacketBuffer::from_bytes(&message.buffer)).unwrap()
    }

    struct Setup {
        acl: Acl,
        blocklist: BlockList,
        cache: MessageCache,
        resolvers: Vec<Arc<dyn Resolver + Send + Sync>>,
        dns64: Option<Dns64>,
    }

    impl Default for Setup {
        fn default() -> Self {
            Self {
                acl: Acl::default(),
                blocklist: BlockList::default(),
                cache: MessageCache::default(),
                resolvers: Vec::new(),
                dns64: None,
            }
        }
    }

    impl Setup {
        fn build(self) -> (DnsHandler, Arc<StatsHandler>) {
            let stats = Arc::new(StatsHandler::new(100));
            let handler = DnsHandler::new(
                self.acl,
                Arc::new(self.blocklist),
                Arc::new(self.cache),
                Arc::new(UpstreamPool::new(self.resolvers)),
                stats.clone(),
                self.dns64,
            );
            (handler, stats)
        }
    }

    fn a_response(qname: &'static str, address: Ipv4Addr) -> DnsPacket {
        DnsPacket::new(Header::response(10))
            .with_question(Question::new(qname.into(), QueryType::A))
            .with_answer(Record::A {
                domain: qname.into(),
                addr: address,
                ttl: 100,
            })
    }

    #[tokio::test]
    async fn should_resolve_and_cache_query() {
        crate::init_logs();

        let mut setup = Setup::default();
        setup.resolvers.push(Arc::new(
            MockResolver::new("upstream").with_response(
                "perdu.com",
                QueryType::A,
                a_response("perdu.com", Ipv4Addr::new(99, 99, 99, 99)),
            ),
        ));
        let (handler, stats) = setup.build();

        let request = query("perdu.com", QueryType::A);

        let first = handler
            .handle(message(socket_address(), &request))
            .await
            .expect("should have a message");
        let first = decode(first);
        assert_eq!(first.header.id, 1);
        assert_eq!(first.answers.len(), 1);

        // Second exchange is served from the cache, same data.
        let second = handler
            .handle(message(socket_address(), &request))
            .await
            .expect("should have a message");
        let second = decode(second);
        assert_eq!(second.answers, first.answers);

        let records = stats.tail(2);
        assert!(records[0].cached);
        assert!(!records[1].cached);
        assert_eq!(records[0].qname, "perdu.com.");
        assert!(records[0].acl);
    }

    #[tokio::test]
    async fn should_block_query_with_txt_reason() {
        crate::init_logs();

        let mut setup = Setup::default();
        setup
            .blocklist
            .add_entry("block.local", QueryType::ANY)
            .unwrap();
        let (handler, stats) = setup.build();

        let result = handler
            .handle(message(socket_address(), &query("sub.block.local", QueryType::A)))
            .await
            .expect("should have a message");
        let result = decode(result);

        assert_eq!(result.header.id, 1);
        assert!(result.header.response);
        assert_eq!(result.header.response_code, ResponseCode::NameError);
        assert_eq!(
            result.resources,
            vec![Record::TXT {
                domain: "".into(),
                text: "Blocked".into(),
                ttl: 0,
            }]
        );

        let records = stats.tail(1);
        assert!(records[0].blocked);
        assert!(!records[0].error);
    }

    #[tokio::test]
    async fn type_specific_block_should_let_other_types_through() {
        crate::init_logs();

        let mut setup = Setup::default();
        setup
            .blocklist
            .add_entry("nip.io:AAAA", QueryType::ANY)
            .unwrap();
        setup.resolvers.push(Arc::new(
            MockResolver::new("upstream").with_response(
                "127.0.0.1.nip.io",
                QueryType::A,
                a_response("127.0.0.1.nip.io", Ipv4Addr::new(127, 0, 0, 1)),
            ),
        ));
        let (handler, _) = setup.build();

        let allowed = handler
            .handle(message(
                socket_address(),
                &query("127.0.0.1.nip.io", QueryType::A),
            ))
            .await
            .expect("should have a message");
        assert_eq!(decode(allowed).header.response_code, ResponseCode::NoError);

        let blocked = handler
            .handle(message(
                socket_address(),
                &query("127.0.0.1.nip.io", QueryType::AAAA),
            ))
            .await
            .expect("should have a message");
        assert_eq!(decode(blocked).header.response_code, ResponseCode::NameError);
    }

    #[tokio::test]
    async fn should_not_answer_without_question() {
        crate::init_logs();

        let (handler, stats) = Setup::default().build();
        let result = handler
            .handle(message(socket_address(), &DnsPacket::new(Header::question(1))))
            .await;
        assert!(result.is_none());

        let records = stats.tail(1);
        assert!(records[0].error);
        assert!(!records[0].acl);
    }

    #[tokio::test]
    async fn should_drop_clients_outside_acl() {
        crate::init_logs();

        let mut setup = Setup::default();
        setup.acl = Acl::new(vec!["10.0.0.0/8".parse().unwrap()]);
        let (handler, stats) = setup.build();

        let result = handler
            .handle(message(socket_address(), &query("perdu.com", QueryType::A)))
            .await;
        assert!(result.is_none());

        let records = stats.tail(1);
        assert!(!records[0].acl);
        assert_eq!(records[0].qname, "perdu.com.");
    }

    #[tokio::test]
    async fn should_servfail_when_all_upstreams_fail() {
        crate::init_logs();

        let mut setup = Setup::default();
        setup
            .resolvers
            .push(Arc::new(MockResolver::failing("broken")));
        let (handler, stats) = setup.build();

        let result = handler
            .handle(message(socket_address(), &query("perdu.com", QueryType::A)))
            .await
            .expect("should have a message");
        let result = decode(result);

        assert_eq!(result.header.response_code, ResponseCode::ServerFailure);
        assert_eq!(
            result.resources,
            vec![Record::TXT {
                domain: "".into(),
                text: "Upstream error".into(),
                ttl: 0,
            }]
        );
        assert!(stats.tail(1)[0].error);
    }

    #[tokio::test]
    async fn dns64_should_synthesize_for_ipv6_clients() {
        crate::init_logs();

        let mut setup = Setup::default();
        setup.dns64 = Some(Dns64::new(Dns64::default_prefix()).unwrap());
        setup.resolvers.push(Arc::new(
            MockResolver::new("upstream")
                .with_response(
                    "127.0.0.1.nip.io",
                    QueryType::AAAA,
                    DnsPacket::new(Header::response(10)).with_question(Question::new(
                        "127.0.0.1.nip.io".into(),
                        QueryType::AAAA,
                    )),
                )
                .with_response(
                    "127.0.0.1.nip.io",
                    QueryType::A,
                    a_response("127.0.0.1.nip.io", Ipv4Addr::new(127, 0, 0, 1)),
                ),
        ));
        let (handler, _) = setup.build();

        let result = handler
            .handle(message(
                ipv6_address(),
                &query("127.0.0.1.nip.io", QueryType::AAAA),
            ))
            .await
            .expect("should have a message");
        let result = decode(result);

        assert_eq!(result.questions[0].qtype, QueryType::AAAA);
        assert_eq!(
            result.answers,
            vec![Record::AAAA {
                domain: "127.0.0.1.nip.io".into(),
                addr: "64:ff9b::7f00:1".parse().unwrap(),
                ttl: 100,
            }]
        );
    }

    #[tokio::test]
    async fn dns64_should_leave_ipv4_clients_alone() {
        crate::init_logs();

        let mut setup = Setup::default();
        setup.dns64 = Some(Dns64::new(Dns64::default_prefix()).unwrap());
        setup.resolvers.push(Arc::new(
            MockResolver::new("upstream").with_response(
                "127.0.0.1.nip.io",
                QueryType::AAAA,
                DnsPacket::new(Header::response(10)).with_question(Question::new(
                    "127.0.0.1.nip.io".into(),
                    QueryType::AAAA,
                )),
            ),
        ));
        let (handler, _) = setup.build();

        let result = handler
            .handle(message(
                socket_address(),
                &query("127.0.0.1.nip.io", QueryType::AAAA),
            ))
            .await
            .expect("should have a message");
        let result = decode(result);

        assert!(result.answers.is_empty());
    }

    #[tokio::test]
    async fn dns64_should_not_rewrite_existing_aaaa_answers() {
        crate::init_logs();

        let mut setup = Setup::default();
        setup.dns64 = Some(Dns64::new(Dns64::default_prefix()).unwrap());
        setup.resolvers.push(Arc::new(
            MockResolver::new("upstream").with_response(
                "v6.perdu.com",
                QueryType::AAAA,
                DnsPacket::new(Header::response(10))
                    .with_question(Question::new("v6.perdu.com".into(), QueryType::AAAA))
                    .with_answer(Record::AAAA {
                        domain: "v6.perdu.com".into(),
                        addr: "2001:db8::1".parse().unwrap(),
                        ttl: 100,
                    }),
            ),
        ));
        let (handler, _) = setup.build();

        let result = handler
            .handle(message(
                ipv6_address(),
                &query("v6.perdu.com", QueryType::AAAA),
            ))
            .await
            .expect("should have a message");
        let result = decode(result);

        assert_eq!(
            result.answers,
            vec![Record::AAAA {
                domain: "v6.perdu.com".into(),
                addr: "2001:db8::1".parse().unwrap(),
                ttl: 100,
            }]
        );
    }

    #[tokio::test]
    async fn should_serve_local_records_without_upstream() {
        crate::init_logs();

        let setup = Setup::default();
        setup
            .cache
            .add_rr("local.lan. 60 IN A 192.168.0.10", true, false)
            .unwrap();
        let (handler, stats) = setup.build();

        let result = handler
            .handle(message(socket_address(), &query("local.lan", QueryType::A)))
            .await
            .expect("should have a message");
        let result = decode(result);

        assert!(result.header.authoritative_answer);
        assert_eq!(result.answers.len(), 1);
        assert!(stats.tail(1)[0].cached);
    }
}
