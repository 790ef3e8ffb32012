use bronto_proto::packet::record::Record;
use bronto_proto::packet::{DnsPacket, QueryType};
use ipnet::{Ipv6Net, PrefixLenError};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// AAAA synthesis from A records for IPv6-only clients (RFC 6147).
#[derive(Debug, Clone)]
pub struct Dns64 {
    prefix: Ipv6Net,
}

impl Dns64 {
    /// The well-known prefix.
    pub fn default_prefix() -> Ipv6Net {
        "64:ff9b::/96".parse().expect("well-known dns64 prefix")
    }

    /// Only /96 prefixes leave room for the four IPv4 octets.
    pub fn new(prefix: Ipv6Net) -> Result<Self, PrefixLenError> {
        if prefix.prefix_len() != 96 {
            return Err(PrefixLenError);
        }
        Ok(Self { prefix })
    }

    /// Whether the client is eligible for synthesis: a real IPv6 peer,
    /// not an IPv4 one behind a mapped address.
    pub fn eligible(client: IpAddr) -> bool {
        match client {
            IpAddr::V6(address) => address.to_ipv4_mapped().is_none(),
            IpAddr::V4(_) => false,
        }
    }

    /// Prefix plus the four IPv4 octets.
    pub fn map(&self, address: Ipv4Addr) -> Ipv6Addr {
        let mut octets = self.prefix.addr().octets();
        octets[12..].copy_from_slice(&address.octets());
        Ipv6Addr::from(octets)
    }

    /// Rewrite an inner A response into the AAAA response served to the
    /// client: every A answer becomes a synthesized AAAA with owner and
    /// TTL preserved, and the question gets its original qtype back.
    pub fn synthesize(&self, mut response: DnsPacket) -> DnsPacket {
        for question in response.questions.iter_mut() {
            if question.qtype == QueryType::A {
                question.qtype = QueryType::AAAA;
            }
        }
        response.answers = response
            .answers
            .into_iter()
            .map(|record| match record {
                Record::A { domain, addr, ttl } => Record::AAAA {
                    domain,
                    addr: self.map(addr),
                    ttl,
                },
                other => other,
            })
            .collect();
        response
    }
}
