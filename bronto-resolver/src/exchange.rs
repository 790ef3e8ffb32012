//! Length-prefixed message framing shared by the TCP fallback and DoT.

use crate::prelude::ResolveError;
use bronto_proto::buffer::BytePacketBuffer;
use bronto_proto::packet::DnsPacket;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub(crate) async fn framed_exchange<S>(
    stream: &mut S,
    payload: &[u8],
    deadline: Duration,
) -> Result<DnsPacket, ResolveError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::time::timeout(deadline, async {
        stream.write_all(&(payload.len() as u16).to_be_bytes()).await?;
        stream.write_all(payload).await?;
        stream.flush().await?;

        let mut length = [0u8; 2];
        stream.read_exact(&mut length).await?;
        let size = u16::from_be_bytes(length) as usize;
        let mut buffer = vec![0u8; size];
        stream.read_exact(&mut buffer).await?;
        Ok(DnsPacket::try_from(BytePacketBuffer::from_bytes(&buffer))?)
    })
    .await
    .map_err(|_| ResolveError::Timeout)?
}

/// One-shot exchange over plain TCP, used when a UDP answer came back
/// truncated.
pub(crate) async fn tcp_exchange(
    address: std::net::SocketAddr,
    payload: &[u8],
    deadline: Duration,
) -> Result<DnsPacket, ResolveError> {
    let mut stream = tokio::time::timeout(deadline, tokio::net::TcpStream::connect(address))
        .await
        .map_err(|_| ResolveError::Timeout)??;
    framed_exchange(&mut stream, payload, deadline).await
}
