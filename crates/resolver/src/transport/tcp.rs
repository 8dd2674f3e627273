//! DNS over TCP (RFC 1035 §4.2.2): each message is prefixed with a
//! two-byte big-endian length.

use super::DnsTransport;
use async_trait::async_trait;
use rootward_domain::ResolverError;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const MAX_TCP_MESSAGE_SIZE: usize = 65535;

pub struct TcpTransport {
    server_addr: SocketAddr,
}

impl TcpTransport {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self { server_addr }
    }

    fn err(&self, reason: String) -> ResolverError {
        ResolverError::Transport {
            server: self.server_addr.to_string(),
            reason,
        }
    }
}

#[async_trait]
impl DnsTransport for TcpTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, ResolverError> {
        let mut stream = tokio::time::timeout(timeout, TcpStream::connect(self.server_addr))
            .await
            .map_err(|_| self.err("timeout connecting".into()))?
            .map_err(|e| self.err(format!("connection failed: {e}")))?;

        let length = (message_bytes.len() as u16).to_be_bytes();

        tokio::time::timeout(timeout, async {
            stream.write_all(&length).await?;
            stream.write_all(message_bytes).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| self.err("timeout sending TCP query".into()))?
        .map_err(|e| self.err(format!("failed to send TCP query: {e}")))?;

        let response = tokio::time::timeout(timeout, async {
            let mut len_buf = [0u8; 2];
            stream
                .read_exact(&mut len_buf)
                .await
                .map_err(|e| self.err(format!("failed to read response length: {e}")))?;

            let response_len = u16::from_be_bytes(len_buf) as usize;
            if response_len > MAX_TCP_MESSAGE_SIZE {
                return Err(self.err(format!("response too large: {response_len} bytes")));
            }

            let mut response = vec![0u8; response_len];
            stream
                .read_exact(&mut response)
                .await
                .map_err(|e| self.err(format!("failed to read response body: {e}")))?;

            Ok(response)
        })
        .await
        .map_err(|_| self.err("timeout waiting for TCP response".into()))??;

        Ok(response)
    }
}
