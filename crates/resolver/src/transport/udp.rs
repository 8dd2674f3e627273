//! DNS over UDP (RFC 1035 §4.2.1).
//!
//! Messages are sent as-is, no framing. Responses are read into a buffer
//! sized for EDNS(0); if the response comes back with the TC bit set the
//! caller retries over TCP.

use super::DnsTransport;
use async_trait::async_trait;
use rootward_domain::ResolverError;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::warn;

/// Maximum UDP response size we advertise via EDNS(0).
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

pub struct UdpTransport {
    server_addr: SocketAddr,
}

impl UdpTransport {
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
impl DnsTransport for UdpTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, ResolverError> {
        let bind_addr: SocketAddr = if self.server_addr.is_ipv4() {
            "0.0.0.0:0".parse().expect("static bind address")
        } else {
            "[::]:0".parse().expect("static bind address")
        };

        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| self.err(format!("failed to bind UDP socket: {e}")))?;

        tokio::time::timeout(timeout, socket.send_to(message_bytes, self.server_addr))
            .await
            .map_err(|_| self.err("timeout sending UDP query".into()))?
            .map_err(|e| self.err(format!("failed to send UDP query: {e}")))?;

        let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];

        let (bytes_received, from_addr) =
            tokio::time::timeout(timeout, socket.recv_from(&mut recv_buf))
                .await
                .map_err(|_| self.err("timeout waiting for UDP response".into()))?
                .map_err(|e| self.err(format!("failed to receive UDP response: {e}")))?;

        if from_addr.ip() != self.server_addr.ip() {
            warn!(
                expected = %self.server_addr,
                received_from = %from_addr,
                "UDP response from unexpected source"
            );
        }

        recv_buf.truncate(bytes_received);
        Ok(recv_buf)
    }
}
