use ipnet::IpNet;
use std::net::IpAddr;

/// Access control list for incoming queries. An empty list admits every
/// client.
///
/// The address compared against the list is the peer address only; for
/// link-local IPv6 peers the interface zone never reaches the comparison
/// because `SocketAddrV6` keeps the scope id outside of `ip()`.
#[derive(Debug, Clone, Default)]
pub struct Acl {
    networks: Vec<IpNet>,
}

impl Acl {
    pub fn new(networks: Vec<IpNet>) -> Self {
        Self { networks }
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn permits(&self, client: IpAddr) -> bool {
        if self.networks.is_empty() {
            return true;
        }
        // Compare IPv4-mapped peers against IPv4 ranges.
        let client = client.to_canonical();
        self.networks.iter().any(|network| network.contains(&client))
    }
}

impl std::fmt::Display for Acl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.networks.is_empty() {
            return write!(f, "allow all");
        }
        let networks: Vec<String> = self.networks.iter().map(IpNet::to_string).collect();
        write!(f, "{}", networks.join(" "))
    }
}
