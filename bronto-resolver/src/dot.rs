use crate::exchange;
use crate::prelude::{ResolveError, Resolver};
use bronto_proto::packet::DnsPacket;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

const TIMEOUT: Duration = Duration::from_secs(2);
/// How many attempts a single resolve makes when pooled connections turn
/// out to be closed.
const RETRY_LIMIT: usize = 3;
/// Idle connections kept per upstream.
const POOL_SIZE: usize = 16;

/// DNS over TLS with a small pool of idle connections.
///
/// Connections that fail an exchange with a closed-connection error are
/// dropped and the exchange retried on a fresh dial; healthy connections
/// are returned to the pool.
pub struct DotResolver {
    address: SocketAddr,
    server_name: ServerName<'static>,
    connector: TlsConnector,
    pool: Mutex<Vec<TlsStream<TcpStream>>>,
}

impl DotResolver {
    pub fn new(address: SocketAddr, server_name: &str) -> Result<Self, InvalidServerName> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|_| InvalidServerName(server_name.to_string()))?;

        Ok(Self {
            address,
            server_name,
            connector: TlsConnector::from(Arc::new(config)),
            pool: Mutex::new(Vec::new()),
        })
    }

    async fn acquire(&self) -> Result<TlsStream<TcpStream>, ResolveError> {
        if let Some(connection) = self.pool.lock().expect("pool lock").pop() {
            return Ok(connection);
        }
        let stream = tokio::time::timeout(TIMEOUT, TcpStream::connect(self.address))
            .await
            .map_err(|_| ResolveError::Timeout)??;
        let connection = tokio::time::timeout(
            TIMEOUT,
            self.connector.connect(self.server_name.clone(), stream),
        )
        .await
        .map_err(|_| ResolveError::Timeout)??;
        Ok(connection)
    }

    fn release(&self, connection: TlsStream<TcpStream>) {
        let mut pool = self.pool.lock().expect("pool lock");
        if pool.len() < POOL_SIZE {
            pool.push(connection);
        }
    }
}

impl std::fmt::Debug for DotResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DotResolver")
            .field("address", &self.address)
            .field("server_name", &self.server_name)
            .finish()
    }
}

impl std::fmt::Display for DotResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tls://{}", self.address)
    }
}

#[async_trait::async_trait]
impl Resolver for DotResolver {
    #[tracing::instrument(skip_all, fields(upstream = %self))]
    async fn resolve(&self, query: &DnsPacket) -> Result<DnsPacket, ResolveError> {
        let payload = query.clone().create_buffer()?;

        let mut attempt = 0;
        loop {
            let mut connection = self.acquire().await?;
            match exchange::framed_exchange(&mut connection, payload.as_slice(), TIMEOUT).await {
                Ok(response) => {
                    self.release(connection);
                    return Ok(response);
                }
                Err(error) if error.is_connection_closed() && attempt + 1 < RETRY_LIMIT => {
                    tracing::debug!("pooled connection closed, retrying: {error}");
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[derive(Debug)]
pub struct InvalidServerName(pub String);

impl std::fmt::Display for InvalidServerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid tls server name {:?}", self.0)
    }
}

impl std::error::Error for InvalidServerName {}

#[cfg(test)]
mod tests {
    use super::DotResolver;

    #[test]
    fn should_accept_ip_server_name() {
        let resolver = DotResolver::new("1.1.1.1:853".parse().unwrap(), "1.1.1.1").unwrap();
        assert_eq!(resolver.to_string(), "tls://1.1.1.1:853");
    }

    #[test]
    fn should_accept_hostname_server_name() {
        assert!(DotResolver::new("9.9.9.9:853".parse().unwrap(), "dns.quad9.net").is_ok());
    }
}
