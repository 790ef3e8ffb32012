use futures::stream::StreamExt;
use prelude::Message;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::watch;

pub mod prelude;
pub mod receiver;
pub mod sender;

/// Large enough for EDNS0 payloads, which get proxied unchanged.
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// How many queries a single listener processes concurrently.
const CONCURRENCY: usize = 64;

#[async_trait::async_trait]
pub trait Handler {
    /// Handle one message; `None` means the query is dropped silently.
    async fn handle(&self, message: Message) -> Option<Message>;
}

/// Bind a UDP socket pinned to the address family of `address`, so that
/// `[::]` wildcards never double-bind onto the IPv4 side.
fn bind_udp(address: SocketAddr) -> std::io::Result<UdpSocket> {
    let domain = if address.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    if address.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&address.into())?;
    UdpSocket::from_std(socket.into())
}

/// Same family pinning for the TCP side.
fn bind_tcp(address: SocketAddr) -> std::io::Result<TcpListener> {
    let domain = if address.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    if address.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&address.into())?;
    socket.listen(1024)?;
    TcpListener::from_std(socket.into())
}

pub struct UdpServer<H> {
    address: SocketAddr,
    handler: Arc<H>,
}

impl<H: Handler + Send + Sync + 'static> UdpServer<H> {
    pub fn new(address: SocketAddr, handler: Arc<H>) -> Self {
        Self { address, handler }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let socket = Arc::new(bind_udp(self.address)?);
        tracing::info!("udp listener bound on {}", self.address);

        let receiver = receiver::Receiver::new(socket.clone());
        let sender = sender::Sender::new(socket);

        let stream = receiver
            .into_stream()
            .map(|item| {
                let handler = self.handler.clone();
                async move { handler.handle(item).await }
            })
            .buffer_unordered(CONCURRENCY);

        tokio::pin!(stream);

        loop {
            tokio::select! {
                item = stream.next() => match item {
                    Some(Some(response)) => {
                        if let Err(error) = sender.send(&response).await {
                            tracing::error!(
                                "couldn't send message to {:?}: {error:?}",
                                response.address
                            );
                        }
                    }
                    // The handler decided to stay silent.
                    Some(None) => {}
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }

        Ok(())
    }
}

pub struct TcpServer<H> {
    address: SocketAddr,
    handler: Arc<H>,
}

impl<H: Handler + Send + Sync + 'static> TcpServer<H> {
    pub fn new(address: SocketAddr, handler: Arc<H>) -> Self {
        Self { address, handler }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let listener = bind_tcp(self.address)?;
        tracing::info!("tcp listener bound on {}", self.address);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, address)) => {
                        let handler = self.handler.clone();
                        tokio::spawn(async move {
                            handle_stream(stream, address, handler).await;
                        });
                    }
                    Err(error) => tracing::warn!("tcp accept failed: {error:?}"),
                },
                _ = shutdown.changed() => break,
            }
        }

        Ok(())
    }
}

/// One length-prefixed exchange per connection; the connection is closed
/// once the response is written.
async fn handle_stream<H: Handler>(mut stream: TcpStream, address: SocketAddr, handler: Arc<H>) {
    let mut length = [0u8; 2];
    if stream.read_exact(&mut length).await.is_err() {
        return;
    }
    let size = u16::from_be_bytes(length) as usize;
    if size == 0 || size > MAX_MESSAGE_SIZE {
        return;
    }

    let mut buffer = vec![0u8; size];
    if stream.read_exact(&mut buffer).await.is_err() {
        return;
    }

    let message = Message { address, buffer };
    if let Some(response) = handler.handle(message).await {
        let length = (response.buffer.len() as u16).to_be_bytes();
        if let Err(error) = stream.write_all(&length).await {
            tracing::debug!("tcp write failed for {address:?}: {error:?}");
            return;
        }
        if let Err(error) = stream.write_all(&response.buffer).await {
            tracing::debug!("tcp write failed for {address:?}: {error:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::prelude::Message;
    use super::{Handler, TcpServer, UdpServer};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::watch;

    struct EchoHandler;

    #[async_trait::async_trait]
    impl Handler for EchoHandler {
        async fn handle(&self, message: Message) -> Option<Message> {
            if message.buffer.is_empty() {
                None
            } else {
                Some(message)
            }
        }
    }

    #[tokio::test]
    async fn udp_server_should_echo() {
        let address = "127.0.0.1:0".parse().unwrap();
        let socket = super::bind_udp(address).unwrap();
        let address = socket.local_addr().unwrap();
        drop(socket);

        let (tx, rx) = watch::channel(false);
        let server = UdpServer::new(address, Arc::new(EchoHandler));
        let task = tokio::spawn(async move { server.run(rx).await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let client = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"ping", address).await.unwrap();
        let mut buffer = [0u8; 16];
        let (size, _) = client.recv_from(&mut buffer).await.unwrap();
        assert_eq!(&buffer[..size], b"ping");

        tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn tcp_server_should_echo_length_prefixed() {
        let address = "127.0.0.1:0".parse().unwrap();
        let listener = super::bind_tcp(address).unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let (tx, rx) = watch::channel(false);
        let server = TcpServer::new(address, Arc::new(EchoHandler));
        let task = tokio::spawn(async move { server.run(rx).await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let mut client = tokio::net::TcpStream::connect(address).await.unwrap();
        client.write_all(&4u16.to_be_bytes()).await.unwrap();
        client.write_all(b"ping").await.unwrap();

        let mut length = [0u8; 2];
        client.read_exact(&mut length).await.unwrap();
        assert_eq!(u16::from_be_bytes(length), 4);
        let mut buffer = [0u8; 4];
        client.read_exact(&mut buffer).await.unwrap();
        assert_eq!(&buffer, b"ping");

        tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }
}
