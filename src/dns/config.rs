use crate::acl::Acl;
use crate::dns::dns64::Dns64;
use crate::dns::error::SetupError;
use ipnet::{IpNet, Ipv6Net};
use std::net::SocketAddr;

const DNS_PORT: u16 = 53;

#[derive(Debug, serde::Deserialize)]
pub struct Config {
    /// Listen addresses, `ip` or `ip:port`; bare addresses get port 53.
    #[serde(default = "Config::default_listen")]
    pub listen: Vec<String>,
    /// Admitted client ranges; empty admits everyone.
    #[serde(default)]
    pub acl: Vec<IpNet>,
    /// Synthesize AAAA answers from A records for IPv6 clients.
    #[serde(default)]
    pub dns64: bool,
    /// Synthesis prefix, /96 required.
    #[serde(default = "Config::default_dns64_prefix")]
    pub dns64_prefix: Ipv6Net,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: Self::default_listen(),
            acl: Vec::new(),
            dns64: false,
            dns64_prefix: Self::default_dns64_prefix(),
        }
    }
}

impl Config {
    pub fn default_listen() -> Vec<String> {
        vec!["127.0.0.1:53".to_string()]
    }

    pub fn default_dns64_prefix() -> Ipv6Net {
        Dns64::default_prefix()
    }

    /// Resolved listen addresses.
    pub fn addresses(&self) -> Result<Vec<SocketAddr>, SetupError> {
        self.listen
            .iter()
            .map(|value| parse_listen(value).ok_or_else(|| SetupError::ListenAddress(value.clone())))
            .collect()
    }

    pub fn acl(&self) -> Acl {
        Acl::new(self.acl.clone())
    }

    pub fn dns64(&self) -> Result<Option<Dns64>, SetupError> {
        if !self.dns64 {
            return Ok(None);
        }
        Dns64::new(self.dns64_prefix)
            .map(Some)
            .map_err(SetupError::Dns64Prefix)
    }
}

/// `ip:port`, `[ip6]:port`, or a bare address with the default port.
fn parse_listen(value: &str) -> Option<SocketAddr> {
    if let Ok(address) = value.parse::<SocketAddr>() {
        return Some(address);
    }
    value
        .parse::<std::net::IpAddr>()
        .ok()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn should_parse_listen_addresses() {
        let config = Config {
            listen: vec![
                "127.0.0.1".to_string(),
                "0.0.0.0:5300".to_string(),
                "::1".to_string(),
                "[::]:5300".to_string(),
            ],
            ..Default::default()
        };
        let addresses = config.addresses().unwrap();
        assert_eq!(addresses[0].to_string(), "127.0.0.1:53");
        assert_eq!(addresses[1].to_string(), "0.0.0.0:5300");
        assert_eq!(addresses[2].to_string(), "[::1]:53");
        assert_eq!(addresses[3].to_string(), "[::]:5300");
    }

    #[test]
    fn should_reject_bad_listen_address() {
        let config = Config {
            listen: vec!["eth0".to_string()],
            ..Default::default()
        };
        assert!(config.addresses().is_err());
    }

    #[test]
    fn dns64_should_validate_prefix_length() {
        let config = Config {
            dns64: true,
            dns64_prefix: "2001:db8::/64".parse().unwrap(),
            ..Default::default()
        };
        assert!(config.dns64().is_err());

        let config = Config {
            dns64: true,
            ..Default::default()
        };
        assert!(config.dns64().unwrap().is_some());

        let config = Config::default();
        assert!(config.dns64().unwrap().is_none());
    }
}
