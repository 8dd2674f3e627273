use crate::answer_cache::AnswerCache;
use crate::context::QueryContext;
use crate::pool::NameserverPool;
use crate::response::{Exchange, Response};
use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use hickory_proto::rr::Record;
use rootward_domain::record::{
    canonical_name, extract_records_of_type, is_strict_subdomain, min_ttl, set_dnssec_ok,
};
use rootward_domain::{ResolverConfig, ResolverError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// How long an empty DNSKEY answer is held before re-asking.
const NEGATIVE_DNSKEY_TTL: Duration = Duration::from_secs(60);

/// One zone we know how to reach: its apex, its parent's apex, the pool of
/// its nameservers, and a cached copy of its DNSKEY rrset.
pub struct Zone {
    name: Name,
    parent: Option<Name>,
    pool: Arc<NameserverPool>,
    calls: AtomicU64,
    dnskey_cache: Mutex<DnskeyCache>,
    answer_cache: Option<Arc<dyn AnswerCache>>,
    config: Arc<ResolverConfig>,
}

#[derive(Default)]
struct DnskeyCache {
    records: Vec<Record>,
    expires: Option<Instant>,
}

impl Zone {
    pub fn new(
        name: Name,
        parent: Option<Name>,
        pool: Arc<NameserverPool>,
        answer_cache: Option<Arc<dyn AnswerCache>>,
        config: Arc<ResolverConfig>,
    ) -> Self {
        Self {
            name: canonical_name(&name),
            parent: parent.as_ref().map(canonical_name),
            pool,
            calls: AtomicU64::new(0),
            dnskey_cache: Mutex::new(DnskeyCache::default()),
            answer_cache,
            config,
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn parent(&self) -> Option<&Name> {
        self.parent.as_ref()
    }

    pub fn expired(&self) -> bool {
        self.pool.expired()
    }

    pub fn pool(&self) -> &Arc<NameserverPool> {
        &self.pool
    }

    /// Exchanges made through this zone since it was created.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// A child zone served by the same nameservers. The DNSKEY cache starts
    /// empty: the child signs with its own keys.
    pub fn clone_as(&self, name: &Name, parent: &Name) -> Zone {
        let name = canonical_name(name);
        let parent = canonical_name(parent);
        assert!(
            name != parent && is_strict_subdomain(&parent, &name),
            "zone clone requires a strict subdomain: [{name}] under [{parent}]"
        );
        Zone {
            name,
            parent: Some(parent),
            pool: Arc::clone(&self.pool),
            calls: AtomicU64::new(0),
            dnskey_cache: Mutex::new(DnskeyCache::default()),
            answer_cache: self.answer_cache.clone(),
            config: Arc::clone(&self.config),
        }
    }

    /// A non-recursive SOA probe for `name` against this zone's servers.
    /// `Ok(None)` when the answer holds no SOA; an error when it holds more
    /// than one.
    pub async fn soa(
        &self,
        ctx: &QueryContext,
        name: &Name,
    ) -> Result<Option<Record>, ResolverError> {
        let mut msg = Message::new();
        msg.set_id(fastrand::u16(..));
        msg.set_message_type(MessageType::Query);
        msg.set_op_code(OpCode::Query);
        msg.set_recursion_desired(false);
        msg.add_query(Query::query(canonical_name(name), RecordType::SOA));

        let response = self.exchange(ctx, &msg).await;
        if response.has_error() {
            return Err(response.err.unwrap_or(ResolverError::EmptyResponse));
        }
        let Some(rmsg) = response.msg else {
            return Err(ResolverError::EmptyResponse);
        };

        let soas = extract_records_of_type(rmsg.answers(), RecordType::SOA);
        match soas.len() {
            0 => Ok(None),
            1 => Ok(soas.into_iter().next()),
            n => Err(ResolverError::InternalError(format!(
                "expected a single SOA for [{name}], got {n}"
            ))),
        }
    }

    /// The zone's DNSKEY rrset (keys and their RRSIGs), cached against the
    /// smallest answer TTL. Concurrent callers queue on the cache lock so
    /// the fetch happens once. An empty answer is remembered briefly.
    pub async fn dnskeys(&self, ctx: &QueryContext) -> Result<Vec<Record>, ResolverError> {
        let mut cache = self.dnskey_cache.lock().await;

        if let Some(expires) = cache.expires {
            if expires > Instant::now() {
                return Ok(cache.records.clone());
            }
        }

        let mut msg = Message::new();
        msg.set_id(fastrand::u16(..));
        msg.set_message_type(MessageType::Query);
        msg.set_op_code(OpCode::Query);
        msg.set_recursion_desired(false);
        msg.add_query(Query::query(self.name.clone(), RecordType::DNSKEY));
        set_dnssec_ok(&mut msg);

        let response = self.exchange(ctx, &msg).await;
        if let Some(err) = response.err {
            return Err(ResolverError::FailedToGetDnskeys {
                zone: self.name.clone(),
                reason: err.to_string(),
            });
        }
        let Some(rmsg) = response.msg else {
            return Err(ResolverError::FailedToGetDnskeys {
                zone: self.name.clone(),
                reason: "response is empty".to_string(),
            });
        };

        if rmsg.answers().is_empty() {
            cache.records = Vec::new();
            cache.expires = Some(Instant::now() + NEGATIVE_DNSKEY_TTL);
            return Ok(Vec::new());
        }

        let ttl = min_ttl(rmsg.answers())
            .unwrap_or(self.config.max_allowed_ttl)
            .min(self.config.max_allowed_ttl);

        cache.records = rmsg.answers().to_vec();
        cache.expires = Some(Instant::now() + Duration::from_secs(u64::from(ttl)));
        Ok(cache.records.clone())
    }
}

#[async_trait]
impl Exchange for Zone {
    async fn exchange(&self, ctx: &QueryContext, msg: &Message) -> Response {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let question = msg.queries().first().cloned();

        if let (Some(cache), Some(question)) = (self.answer_cache.as_ref(), question.as_ref()) {
            match cache.get(&self.name, question).await {
                Ok(Some(cached)) => {
                    debug!(
                        trace = %ctx.trace.short_id(),
                        iteration = ctx.trace.iteration(),
                        qname = %question.name(),
                        qtype = %question.query_type(),
                        zone = %self.name,
                        "answer found in cache"
                    );
                    return Response::from_msg(cached);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(zone = %self.name, error = %e, "answer cache lookup failed");
                }
            }
        }

        let zone_ctx = ctx.for_zone(&self.name);
        let response = self.pool.exchange(&zone_ctx, msg).await;

        if let (Some(cache), Some(question), Some(rmsg)) =
            (self.answer_cache.as_ref(), question, response.msg.as_ref())
        {
            if !response.has_error() {
                let cache = Arc::clone(cache);
                let zone = self.name.clone();
                let mut copy = rmsg.clone();
                // EDNS options are hop-by-hop; they never go in the cache.
                *copy.extensions_mut() = None;
                tokio::spawn(async move {
                    if let Err(e) = cache.update(&zone, &question, &copy).await {
                        warn!(zone = %zone, error = %e, "answer cache update failed");
                    }
                });
            }
        }

        response
    }
}
