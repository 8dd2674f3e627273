use crate::context::QueryContext;
use crate::dnssec::{AuthState, DoeState};
use async_trait::async_trait;
use hickory_proto::op::Message;
use rootward_domain::ResolverError;
use std::time::Duration;

/// The outcome of an exchange. A response can carry a message, an error, or
/// both — a nameserver can answer *and* the attempt can still be deemed
/// failed (truncation, timeout on the retry, bogus validation).
#[derive(Debug, Default)]
pub struct Response {
    pub msg: Option<Message>,
    pub err: Option<ResolverError>,
    pub auth: AuthState,
    pub doe: DoeState,
    pub elapsed: Duration,
}

impl Response {
    pub fn from_msg(msg: Message) -> Self {
        Self {
            msg: Some(msg),
            ..Self::default()
        }
    }

    pub fn from_error(err: ResolverError) -> Self {
        Self {
            err: Some(err),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.msg.is_none()
    }

    pub fn has_error(&self) -> bool {
        self.err.is_some()
    }

    pub fn truncated(&self) -> bool {
        self.msg.as_ref().map(Message::truncated).unwrap_or(false)
    }
}

/// Anything able to answer a DNS message: a single nameserver, a pool, a
/// zone, or the whole resolver.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn exchange(&self, ctx: &QueryContext, msg: &Message) -> Response;
}
