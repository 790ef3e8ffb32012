use crate::prelude::{ResolveError, Resolver};
use bronto_proto::buffer::BytePacketBuffer;
use bronto_proto::packet::DnsPacket;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);
const DNS_MESSAGE: &str = "application/dns-message";

/// DNS over HTTPS: the wire-format query is POSTed to the resolver URL.
#[derive(Debug)]
pub struct DohResolver {
    url: String,
    client: reqwest::Client,
}

impl DohResolver {
    pub fn new<U: Into<String>>(url: U) -> Result<Self, reqwest::Error> {
        Ok(Self {
            url: url.into(),
            client: reqwest::Client::builder().timeout(TIMEOUT).build()?,
        })
    }
}

impl std::fmt::Display for DohResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[async_trait::async_trait]
impl Resolver for DohResolver {
    #[tracing::instrument(skip_all, fields(upstream = %self))]
    async fn resolve(&self, query: &DnsPacket) -> Result<DnsPacket, ResolveError> {
        let payload = query.clone().create_buffer()?;

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, DNS_MESSAGE)
            .header(reqwest::header::ACCEPT, DNS_MESSAGE)
            .body(payload.as_slice().to_vec())
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(ResolveError::HttpStatus(status));
        }

        let body = response.bytes().await?;
        Ok(DnsPacket::try_from(BytePacketBuffer::from_bytes(&body))?)
    }
}
