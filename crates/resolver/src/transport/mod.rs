pub mod tcp;
pub mod udp;

use async_trait::async_trait;
use rootward_domain::ResolverError;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Udp,
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp => write!(f, "udp"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// A one-shot exchange of raw DNS message bytes with a single server.
#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, ResolverError>;
}

/// Produces the transport used for one attempt against one server. The
/// default factory speaks real UDP and TCP; tests substitute canned
/// responders here.
pub trait TransportFactory: Send + Sync {
    fn transport(&self, protocol: Protocol, server: SocketAddr) -> Arc<dyn DnsTransport>;
}

#[derive(Debug, Default)]
pub struct SocketTransportFactory;

impl TransportFactory for SocketTransportFactory {
    fn transport(&self, protocol: Protocol, server: SocketAddr) -> Arc<dyn DnsTransport> {
        match protocol {
            Protocol::Udp => Arc::new(udp::UdpTransport::new(server)),
            Protocol::Tcp => Arc::new(tcp::TcpTransport::new(server)),
        }
    }
}
