pub mod reader;
pub mod writer;

pub use reader::ReaderError;
pub use writer::WriterError;

use std::collections::HashMap;

/// Maximum size of a DNS message we handle. Large enough for EDNS0
/// payloads that get forwarded through the proxy.
pub const PACKET_SIZE: usize = 4096;

pub struct BytePacketBuffer {
    pub buf: [u8; PACKET_SIZE],
    pub pos: usize,
    /// Offsets of labels already decoded, for compression jumps.
    reading_labels: HashMap<usize, String>,
    /// Offsets of labels already written, for compression pointers.
    writing_labels: HashMap<String, usize>,
}

impl Default for BytePacketBuffer {
    /// This gives us a fresh buffer for holding the packet contents, and a
    /// field for keeping track of where we are.
    fn default() -> Self {
        BytePacketBuffer {
            buf: [0; PACKET_SIZE],
            pos: 0,
            reading_labels: HashMap::new(),
            writing_labels: HashMap::new(),
        }
    }
}

impl BytePacketBuffer {
    pub fn new(buf: [u8; PACKET_SIZE]) -> Self {
        Self {
            buf,
            pos: 0,
            reading_labels: HashMap::new(),
            writing_labels: HashMap::new(),
        }
    }

    /// Build a buffer from a datagram or TCP payload of any length up to
    /// [`PACKET_SIZE`].
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut buf = [0; PACKET_SIZE];
        let size = data.len().min(PACKET_SIZE);
        buf[..size].copy_from_slice(&data[..size]);
        Self::new(buf)
    }

    /// Current position within buffer
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// The written portion of the buffer.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.pos]
    }
}
