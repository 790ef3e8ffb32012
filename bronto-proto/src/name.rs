//! Canonical domain name helpers.
//!
//! The canonical form used throughout the proxy is all-lowercase with
//! exactly one trailing dot; the root is the single-dot string.

use std::fmt::Write;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Canonical form of a domain name.
pub fn canonical_name(name: &str) -> String {
    if name.is_empty() || name == "." {
        return String::from(".");
    }
    let mut out = name.trim_end_matches('.').to_lowercase();
    out.push('.');
    out
}

/// Labels of a domain name in natural order, without the trailing empty
/// label. Empty for the root.
pub fn split_name(name: &str) -> Vec<String> {
    if name.is_empty() || name == "." {
        return Vec::new();
    }
    name.trim_end_matches('.')
        .to_lowercase()
        .split('.')
        .map(String::from)
        .collect()
}

/// Reverse lookup name for an IPv4 address: `1.2.3.4` becomes
/// `4.3.2.1.in-addr.arpa.`.
pub fn reverse_ipv4(ip: Ipv4Addr) -> String {
    let mut out = String::new();
    for octet in ip.octets().iter().rev() {
        write!(out, "{octet}.").expect("write to string");
    }
    out.push_str("in-addr.arpa.");
    out
}

/// Reverse lookup name for an IPv6 address: 32 nibbles in reverse order
/// followed by `ip6.arpa.`.
pub fn reverse_ipv6(ip: Ipv6Addr) -> String {
    let mut out = String::new();
    for byte in ip.octets().iter().rev() {
        write!(out, "{:x}.{:x}.", byte & 0xF, byte >> 4).expect("write to string");
    }
    out.push_str("ip6.arpa.");
    out
}
