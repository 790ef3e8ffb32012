use crate::exchange;
use crate::prelude::{ResolveError, Resolver};
use bronto_proto::buffer::{BytePacketBuffer, PACKET_SIZE};
use bronto_proto::packet::DnsPacket;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

const TIMEOUT: Duration = Duration::from_secs(2);

/// One-shot UDP exchange; retries over TCP when the answer comes back
/// with the TC bit set.
#[derive(Debug)]
pub struct UdpResolver {
    address: SocketAddr,
}

impl UdpResolver {
    pub fn new(address: SocketAddr) -> Self {
        Self { address }
    }
}

impl std::fmt::Display for UdpResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "udp://{}", self.address)
    }
}

#[async_trait::async_trait]
impl Resolver for UdpResolver {
    #[tracing::instrument(skip_all, fields(upstream = %self))]
    async fn resolve(&self, query: &DnsPacket) -> Result<DnsPacket, ResolveError> {
        let payload = query.clone().create_buffer()?;

        let bind_address: SocketAddr = if self.address.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(bind_address).await?;
        socket.send_to(payload.as_slice(), self.address).await?;

        let mut buffer = [0u8; PACKET_SIZE];
        let (size, _) = tokio::time::timeout(TIMEOUT, socket.recv_from(&mut buffer))
            .await
            .map_err(|_| ResolveError::Timeout)??;

        let response = DnsPacket::try_from(BytePacketBuffer::from_bytes(&buffer[..size]))?;

        if response.header.truncated_message {
            tracing::debug!("response truncated, retrying over tcp");
            return exchange::tcp_exchange(self.address, payload.as_slice(), TIMEOUT).await;
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::UdpResolver;
    use crate::prelude::{ResolveError, Resolver};
    use bronto_proto::buffer::BytePacketBuffer;
    use bronto_proto::packet::header::Header;
    use bronto_proto::packet::question::Question;
    use bronto_proto::packet::record::Record;
    use bronto_proto::packet::{DnsPacket, QueryType};
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn should_exchange_over_udp() {
        let server = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = server.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buffer = [0u8; 512];
            let (size, peer) = server.recv_from(&mut buffer).await.unwrap();
            let request =
                DnsPacket::try_from(BytePacketBuffer::from_bytes(&buffer[..size])).unwrap();
            let mut response = DnsPacket::response_from(&request).with_answer(Record::A {
                domain: "perdu.com".into(),
                addr: Ipv4Addr::new(10, 0, 0, 1),
                ttl: 60,
            });
            let out = response.create_buffer().unwrap();
            server.send_to(out.as_slice(), peer).await.unwrap();
        });

        let query = DnsPacket::new(Header::question(42))
            .with_question(Question::new("perdu.com".into(), QueryType::A));
        let response = UdpResolver::new(address).resolve(&query).await.unwrap();

        assert_eq!(response.header.id, 42);
        assert_eq!(response.answers.len(), 1);
    }

    #[tokio::test]
    async fn should_time_out_on_silence() {
        let server = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = server.local_addr().unwrap();

        let query = DnsPacket::new(Header::question(42))
            .with_question(Question::new("perdu.com".into(), QueryType::A));
        let error = UdpResolver::new(address).resolve(&query).await.unwrap_err();
        assert!(matches!(error, ResolveError::Timeout));
    }
}
