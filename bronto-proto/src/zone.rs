//! Zone-file resource record parsing.
//!
//! Accepts the single-line format used for operator supplied records:
//! `name ttl [IN] TYPE rdata`. The origin is the root and the class
//! defaults to IN; only the record types the proxy serves are accepted.

use crate::name::canonical_name;
use crate::packet::record::Record;
use std::fmt::Display;

#[derive(Debug, PartialEq, Eq)]
pub enum ZoneError {
    MissingField(&'static str),
    InvalidTtl(String),
    InvalidClass(String),
    InvalidType(String),
    InvalidAddress(String),
    InvalidRdata(String),
}

impl Display for ZoneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing {field} field"),
            Self::InvalidTtl(value) => write!(f, "invalid ttl {value:?}"),
            Self::InvalidClass(value) => write!(f, "invalid class {value:?}"),
            Self::InvalidType(value) => write!(f, "invalid record type {value:?}"),
            Self::InvalidAddress(value) => write!(f, "invalid address {value:?}"),
            Self::InvalidRdata(value) => write!(f, "invalid rdata {value:?}"),
        }
    }
}

impl std::error::Error for ZoneError {}

/// Parse one zone-file line into a resource record.
pub fn parse_record(line: &str) -> Result<Record, ZoneError> {
    let mut tokens = line.split_whitespace();

    let name = tokens.next().ok_or(ZoneError::MissingField("name"))?;
    let domain = canonical_name(name);

    let ttl_token = tokens.next().ok_or(ZoneError::MissingField("ttl"))?;
    let ttl: u32 = ttl_token
        .parse()
        .map_err(|_| ZoneError::InvalidTtl(ttl_token.to_string()))?;

    // Optional class field, IN only.
    let mut type_token = tokens.next().ok_or(ZoneError::MissingField("type"))?;
    if type_token.eq_ignore_ascii_case("in") {
        type_token = tokens.next().ok_or(ZoneError::MissingField("type"))?;
    } else if type_token.eq_ignore_ascii_case("ch")
        || type_token.eq_ignore_ascii_case("cs")
        || type_token.eq_ignore_ascii_case("hs")
    {
        return Err(ZoneError::InvalidClass(type_token.to_string()));
    }

    match type_token.to_uppercase().as_str() {
        "A" => {
            let addr = tokens.next().ok_or(ZoneError::MissingField("address"))?;
            Ok(Record::A {
                domain,
                addr: addr
                    .parse()
                    .map_err(|_| ZoneError::InvalidAddress(addr.to_string()))?,
                ttl,
            })
        }
        "AAAA" => {
            let addr = tokens.next().ok_or(ZoneError::MissingField("address"))?;
            Ok(Record::AAAA {
                domain,
                addr: addr
                    .parse()
                    .map_err(|_| ZoneError::InvalidAddress(addr.to_string()))?,
                ttl,
            })
        }
        "NS" => Ok(Record::NS {
            domain,
            host: canonical_name(tokens.next().ok_or(ZoneError::MissingField("host"))?),
            ttl,
        }),
        "CNAME" => Ok(Record::CNAME {
            domain,
            host: canonical_name(tokens.next().ok_or(ZoneError::MissingField("host"))?),
            ttl,
        }),
        "PTR" => Ok(Record::PTR {
            domain,
            host: canonical_name(tokens.next().ok_or(ZoneError::MissingField("host"))?),
            ttl,
        }),
        "MX" => {
            let priority_token = tokens.next().ok_or(ZoneError::MissingField("priority"))?;
            let priority: u16 = priority_token
                .parse()
                .map_err(|_| ZoneError::InvalidRdata(priority_token.to_string()))?;
            Ok(Record::MX {
                domain,
                priority,
                host: canonical_name(tokens.next().ok_or(ZoneError::MissingField("host"))?),
                ttl,
            })
        }
        "TXT" => {
            // The remainder of the line, optionally quoted.
            let rest = tokens.collect::<Vec<_>>().join(" ");
            if rest.is_empty() {
                return Err(ZoneError::MissingField("text"));
            }
            let text = rest
                .strip_prefix('"')
                .and_then(|value| value.strip_suffix('"'))
                .unwrap_or(&rest)
                .to_string();
            Ok(Record::TXT { domain, text, ttl })
        }
        "SRV" => {
            let mut field = |name: &'static str| -> Result<u16, ZoneError> {
                let token = tokens.next().ok_or(ZoneError::MissingField(name))?;
                token
                    .parse()
                    .map_err(|_| ZoneError::InvalidRdata(token.to_string()))
            };
            let priority = field("priority")?;
            let weight = field("weight")?;
            let port = field("port")?;
            Ok(Record::SRV {
                domain,
                priority,
                weight,
                port,
                target: canonical_name(tokens.next().ok_or(ZoneError::MissingField("target"))?),
                ttl,
            })
        }
        other => Err(ZoneError::InvalidType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_record, ZoneError};
    use crate::packet::record::Record;
    use std::net::Ipv4Addr;

    #[test]
    fn should_parse_a_record() {
        let record = parse_record("abc.com. 60 IN A 1.2.3.4").unwrap();
        assert_eq!(
            record,
            Record::A {
                domain: "abc.com.".into(),
                addr: Ipv4Addr::new(1, 2, 3, 4),
                ttl: 60,
            }
        );
    }

    #[test]
    fn should_parse_without_class() {
        let record = parse_record("abc.com 60 A 1.2.3.4").unwrap();
        assert_eq!(record.ttl(), 60);
        assert_eq!(record.domain(), "abc.com.");
    }

    #[test]
    fn should_parse_aaaa_record() {
        let record = parse_record("v6.abc.com. 300 IN AAAA 2001:db8::1").unwrap();
        match record {
            Record::AAAA { addr, .. } => assert_eq!(addr, "2001:db8::1".parse::<std::net::Ipv6Addr>().unwrap()),
            other => panic!("expected AAAA, got {other:?}"),
        }
    }

    #[test]
    fn should_parse_quoted_txt() {
        let record = parse_record("note.abc.com. 60 IN TXT \"hello world\"").unwrap();
        match record {
            Record::TXT { text, .. } => assert_eq!(text, "hello world"),
            other => panic!("expected TXT, got {other:?}"),
        }
    }

    #[test]
    fn should_parse_mx_and_srv() {
        let mx = parse_record("abc.com. 60 IN MX 10 mail.abc.com.").unwrap();
        match mx {
            Record::MX { priority, host, .. } => {
                assert_eq!(priority, 10);
                assert_eq!(host, "mail.abc.com.");
            }
            other => panic!("expected MX, got {other:?}"),
        }
        let srv = parse_record("_dns._udp.abc.com. 60 IN SRV 10 5 53 ns.abc.com.").unwrap();
        match srv {
            Record::SRV { port, target, .. } => {
                assert_eq!(port, 53);
                assert_eq!(target, "ns.abc.com.");
            }
            other => panic!("expected SRV, got {other:?}"),
        }
    }

    #[test]
    fn should_reject_malformed_lines() {
        assert_eq!(
            parse_record("abc.com. sixty IN A 1.2.3.4").unwrap_err(),
            ZoneError::InvalidTtl("sixty".into())
        );
        assert_eq!(
            parse_record("abc.com. 60 IN WKS something").unwrap_err(),
            ZoneError::InvalidType("WKS".into())
        );
        assert_eq!(
            parse_record("abc.com. 60 IN A not-an-ip").unwrap_err(),
            ZoneError::InvalidAddress("not-an-ip".into())
        );
        assert_eq!(
            parse_record("abc.com.").unwrap_err(),
            ZoneError::MissingField("ttl")
        );
    }
}
