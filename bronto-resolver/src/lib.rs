pub mod doh;
pub mod dot;
mod exchange;
#[cfg(feature = "mock")]
pub mod mock;
pub mod prelude;
pub mod udp;

use prelude::Resolver;
use std::net::SocketAddr;

const DNS_PORT: u16 = 53;
const DOT_PORT: u16 = 853;

#[derive(Debug)]
pub enum EndpointError {
    InvalidAddress(String),
    InvalidServerName(String),
    Http(reqwest::Error),
}

impl std::fmt::Display for EndpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAddress(value) => write!(f, "invalid upstream address {value:?}"),
            Self::InvalidServerName(value) => write!(f, "invalid tls server name {value:?}"),
            Self::Http(error) => write!(f, "unable to build http client: {error}"),
        }
    }
}

impl std::error::Error for EndpointError {}

fn parse_address(value: &str, default_port: u16) -> Result<SocketAddr, EndpointError> {
    if let Ok(address) = value.parse::<SocketAddr>() {
        return Ok(address);
    }
    // Bare IP, default port.
    value
        .parse::<std::net::IpAddr>()
        .map(|ip| SocketAddr::new(ip, default_port))
        .map_err(|_| EndpointError::InvalidAddress(value.to_string()))
}

/// Build a resolver from an endpoint string: `udp://ip[:port]`,
/// `tls://ip[:port]`, `https://…`, or a bare `ip[:port]` treated as UDP.
pub fn from_endpoint(endpoint: &str) -> Result<Box<dyn Resolver + Send + Sync>, EndpointError> {
    if endpoint.starts_with("https://") {
        let resolver = doh::DohResolver::new(endpoint).map_err(EndpointError::Http)?;
        return Ok(Box::new(resolver));
    }
    if let Some(rest) = endpoint.strip_prefix("tls://") {
        let address = parse_address(rest, DOT_PORT)?;
        let resolver = dot::DotResolver::new(address, &address.ip().to_string())
            .map_err(|error| EndpointError::InvalidServerName(error.0))?;
        return Ok(Box::new(resolver));
    }
    let rest = endpoint.strip_prefix("udp://").unwrap_or(endpoint);
    let address = parse_address(rest, DNS_PORT)?;
    Ok(Box::new(udp::UdpResolver::new(address)))
}

#[cfg(test)]
mod tests {
    use super::from_endpoint;

    #[test]
    fn should_build_udp_resolver_from_bare_address() {
        let resolver = from_endpoint("1.1.1.1").unwrap();
        assert_eq!(resolver.to_string(), "udp://1.1.1.1:53");
    }

    #[test]
    fn should_build_udp_resolver_with_port() {
        let resolver = from_endpoint("udp://127.0.0.1:5353").unwrap();
        assert_eq!(resolver.to_string(), "udp://127.0.0.1:5353");
    }

    #[test]
    fn should_build_dot_resolver() {
        let resolver = from_endpoint("tls://1.1.1.1").unwrap();
        assert_eq!(resolver.to_string(), "tls://1.1.1.1:853");
    }

    #[test]
    fn should_build_doh_resolver() {
        let resolver = from_endpoint("https://cloudflare-dns.com/dns-query").unwrap();
        assert_eq!(resolver.to_string(), "https://cloudflare-dns.com/dns-query");
    }

    #[test]
    fn should_reject_garbage() {
        assert!(from_endpoint("not an address").is_err());
    }
}
