use bronto_proto::buffer::{ReaderError, WriterError};
use bronto_proto::packet::DnsPacket;

#[derive(Debug)]
pub enum ResolveError {
    Io(std::io::Error),
    Timeout,
    Http(reqwest::Error),
    HttpStatus(u16),
    Reader(ReaderError),
    Writer(WriterError),
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(error) => write!(f, "i/o error: {error}"),
            Self::Timeout => write!(f, "exchange timed out"),
            Self::Http(error) => write!(f, "http error: {error}"),
            Self::HttpStatus(status) => write!(f, "http request failed with status {status}"),
            Self::Reader(error) => write!(f, "unable to parse response: {error}"),
            Self::Writer(error) => write!(f, "unable to encode query: {error}"),
        }
    }
}

impl std::error::Error for ResolveError {}

impl From<std::io::Error> for ResolveError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<reqwest::Error> for ResolveError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

impl From<ReaderError> for ResolveError {
    fn from(value: ReaderError) -> Self {
        Self::Reader(value)
    }
}

impl From<WriterError> for ResolveError {
    fn from(value: WriterError) -> Self {
        Self::Writer(value)
    }
}

impl ResolveError {
    /// Errors that look like the remote end closed the connection; a pooled
    /// connection hitting one of these is worth a retry on a fresh one.
    pub fn is_connection_closed(&self) -> bool {
        use std::io::ErrorKind;
        match self {
            Self::Io(error) => matches!(
                error.kind(),
                ErrorKind::UnexpectedEof
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::NotConnected
                    | ErrorKind::WriteZero
            ),
            _ => false,
        }
    }
}

/// An upstream resolver behind one of the supported transports.
///
/// The whole query message is forwarded so EDNS0 options survive the trip;
/// the `Display` form identifies the upstream in logs.
#[async_trait::async_trait]
pub trait Resolver: std::fmt::Debug + std::fmt::Display {
    async fn resolve(&self, query: &DnsPacket) -> Result<DnsPacket, ResolveError>;
}
