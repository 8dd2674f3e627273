use crate::context::QueryContext;
use crate::response::{Exchange, Response};
use crate::transport::{Protocol, TransportFactory};
use async_trait::async_trait;
use hickory_proto::op::Message;
use hickory_proto::rr::Name;
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};
use rootward_domain::ResolverError;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::trace;

/// A single upstream server: the hostname it was delegated under, one of
/// its addresses, and running metrics for the exchanges we've made with it.
pub struct Nameserver {
    hostname: Name,
    addr: IpAddr,
    factory: Arc<dyn TransportFactory>,
    timeout_udp: Duration,
    timeout_tcp: Duration,
    metrics: Mutex<NameserverMetrics>,
}

#[derive(Clone, Debug, Default)]
pub struct NameserverMetrics {
    pub requests: u32,
    pub tcp_requests: u32,
    pub total_response_time: Duration,
    pub average_response_time: Duration,
    pub tcp_ratio: f32,
}

impl Nameserver {
    pub fn new(
        hostname: Name,
        addr: IpAddr,
        factory: Arc<dyn TransportFactory>,
        timeout_udp: Duration,
        timeout_tcp: Duration,
    ) -> Self {
        Self {
            hostname,
            addr,
            factory,
            timeout_udp,
            timeout_tcp,
            metrics: Mutex::new(NameserverMetrics::default()),
        }
    }

    pub fn hostname(&self) -> &Name {
        &self.hostname
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn metrics(&self) -> NameserverMetrics {
        self.metrics.lock().expect("metrics lock").clone()
    }

    fn update_metrics(&self, protocol: Protocol, duration: Duration) {
        let mut m = self.metrics.lock().expect("metrics lock");
        m.requests += 1;
        m.total_response_time += duration;
        m.average_response_time = m.total_response_time / m.requests;
        if protocol == Protocol::Tcp {
            m.tcp_requests += 1;
        }
        m.tcp_ratio = m.tcp_requests as f32 / m.requests as f32;
    }

    fn encode(msg: &Message) -> Result<Vec<u8>, ResolverError> {
        let mut buf = Vec::with_capacity(512);
        let mut encoder = BinEncoder::new(&mut buf);
        msg.emit(&mut encoder)
            .map_err(|e| ResolverError::MessageFormat(e.to_string()))?;
        Ok(buf)
    }
}

#[async_trait]
impl Exchange for Nameserver {
    /// UDP first; on an error or a truncated answer the same message goes
    /// out again over TCP to the same server. The TCP result wins if it
    /// ran, otherwise whichever attempt ran last is returned as-is.
    async fn exchange(&self, ctx: &QueryContext, msg: &Message) -> Response {
        if msg.queries().is_empty() {
            return Response::from_error(ResolverError::NilMessageSentToExchange {
                zone: ctx.zone_label(),
            });
        }

        let bytes = match Self::encode(msg) {
            Ok(bytes) => bytes,
            Err(e) => return Response::from_error(e),
        };

        // SocketAddr renders IPv6 bracketed, so the target is always
        // well-formed for both families.
        let server = SocketAddr::new(self.addr, 53);
        let question = &msg.queries()[0];

        let mut response = Response::default();

        for protocol in [Protocol::Udp, Protocol::Tcp] {
            let timeout = ctx.clamp_timeout(match protocol {
                Protocol::Udp => self.timeout_udp,
                Protocol::Tcp => self.timeout_tcp,
            });

            let transport = self.factory.transport(protocol, server);
            let started = Instant::now();
            let result = transport.send(&bytes, timeout).await;
            let elapsed = started.elapsed();

            trace!(
                trace = %ctx.trace.short_id(),
                iteration = ctx.trace.iteration(),
                elapsed = ?elapsed,
                qname = %question.name(),
                qtype = %question.query_type(),
                zone = %ctx.zone_label(),
                protocol = %protocol,
                server = %self.hostname,
                addr = %server,
                "upstream exchange"
            );

            self.update_metrics(protocol, elapsed);

            match result {
                Err(e) => {
                    response = Response::from_error(e);
                    continue;
                }
                Ok(raw) => match Message::from_vec(&raw) {
                    Err(e) => {
                        response = Response::from_error(ResolverError::MessageFormat(
                            e.to_string(),
                        ));
                        continue;
                    }
                    Ok(decoded) => {
                        response = Response::from_msg(decoded);
                        response.elapsed = elapsed;
                        if !response.truncated() {
                            return response;
                        }
                    }
                },
            }
        }

        // May still be truncated or errored; it's the best we've got.
        response
    }
}
