use std::net::SocketAddr;

/// One DNS message on the wire, either direction.
pub struct Message {
    pub address: SocketAddr,
    pub buffer: Vec<u8>,
}
