mod cname;
mod exchange;
mod finalise;

use crate::answer_cache::AnswerCache;
use crate::context::QueryContext;
use crate::hints;
use crate::response::{Exchange, Response};
use crate::transport::{SocketTransportFactory, TransportFactory};
use crate::zone::Zone;
use crate::zones::ZoneStore;
use async_trait::async_trait;
use hickory_proto::dnssec::rdata::DS;
use hickory_proto::op::Message;
use hickory_proto::rr::Name;
use rootward_domain::{ResolverConfig, ResolverError};
use std::sync::{Arc, Weak};
use tracing::debug;

/// An iterative, validating resolver: walks delegations from the root
/// hints towards the authoritative servers for a name, optionally proving
/// the DNSSEC chain of trust along the way.
pub struct Resolver {
    pub(crate) zones: ZoneStore,
    pub(crate) config: Arc<ResolverConfig>,
    pub(crate) transports: Arc<dyn TransportFactory>,
    pub(crate) answer_cache: Option<Arc<dyn AnswerCache>>,
    pub(crate) trust_anchors: Vec<DS>,
    self_ref: Weak<Resolver>,
}

pub struct ResolverBuilder {
    config: ResolverConfig,
    transports: Arc<dyn TransportFactory>,
    answer_cache: Option<Arc<dyn AnswerCache>>,
    trust_anchors: Vec<DS>,
}

impl ResolverBuilder {
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the real UDP/TCP transports, e.g. with canned responders.
    pub fn with_transport_factory(mut self, transports: Arc<dyn TransportFactory>) -> Self {
        self.transports = transports;
        self
    }

    pub fn with_answer_cache(mut self, cache: Arc<dyn AnswerCache>) -> Self {
        self.answer_cache = Some(cache);
        self
    }

    pub fn with_trust_anchors(mut self, anchors: Vec<DS>) -> Self {
        self.trust_anchors = anchors;
        self
    }

    pub fn build(self) -> Arc<Resolver> {
        let config = Arc::new(self.config);

        Arc::new_cyclic(|self_ref| {
            let root_pool = Arc::new(hints::root_server_pool(
                Arc::clone(&self.transports),
                Arc::clone(&config),
            ));

            let zones = ZoneStore::new();
            zones.add(Arc::new(Zone::new(
                Name::root(),
                None,
                root_pool,
                self.answer_cache.clone(),
                Arc::clone(&config),
            )));

            Resolver {
                zones,
                config,
                transports: self.transports,
                answer_cache: self.answer_cache,
                trust_anchors: self.trust_anchors,
                self_ref: self_ref.clone(),
            }
        })
    }
}

impl Default for ResolverBuilder {
    fn default() -> Self {
        Self {
            config: ResolverConfig::default(),
            transports: Arc::new(SocketTransportFactory),
            answer_cache: None,
            trust_anchors: crate::dnssec::trust_anchor::root_trust_anchors(),
        }
    }
}

impl Resolver {
    /// A resolver primed with the bundled root hints and trust anchors.
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::default()
    }

    /// How many zones the resolver has learned about so far.
    pub fn count_zones(&self) -> usize {
        self.zones.count()
    }

    /// Resolves a client query. The recursion-desired flag must be set;
    /// everything else about the message is taken as-is (a copy is worked
    /// on, the input is never mutated).
    pub async fn exchange(&self, qmsg: &Message) -> Response {
        if !qmsg.recursion_desired() {
            return Response::from_error(ResolverError::NotRecursionDesired);
        }

        let ctx = QueryContext::new();
        debug!(trace = %ctx.trace.id(), "new query started");

        self.resolve(&ctx, qmsg.clone()).await
    }

    /// The trait-object handle sub-systems (zone factory enrichment, CNAME
    /// follow-up) use to re-enter the engine.
    pub(crate) fn exchanger(&self) -> Result<Arc<dyn Exchange>, ResolverError> {
        self.self_ref
            .upgrade()
            .map(|resolver| resolver as Arc<dyn Exchange>)
            .ok_or_else(|| {
                ResolverError::InternalError("resolver dropped mid-query".to_string())
            })
    }
}

#[async_trait]
impl Exchange for Resolver {
    async fn exchange(&self, ctx: &QueryContext, msg: &Message) -> Response {
        self.resolve(ctx, msg.clone()).await
    }
}
