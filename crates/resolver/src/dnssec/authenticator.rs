//! The streaming chain authenticator. The engine hands over one response
//! per zone as the walk proceeds; delegation-signer lookups for zones we
//! already knew arrive from background tasks. Responses are buffered by
//! the label count of the zone they belong to and processed strictly
//! root → leaf, so submission order doesn't matter.

use super::trust_anchor::root_trust_anchors;
use super::types::{SignerZone, WrappedZone, ZoneResult, ZoneSigner};
use super::verifier::verify_response;
use super::{AuthState, DoeState};
use crate::context::QueryContext;
use crate::zone::Zone;
use hickory_proto::dnssec::rdata::DS;
use hickory_proto::op::{Message, Query};
use hickory_proto::rr::{Name, RecordType};
use rootward_domain::record::{
    canonical_name, extract_records_of_name_and_type, records_of_type_exist,
};
use rootward_domain::{ResolverConfig, ResolverError};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// How many elided delegations we'll stitch back together for a single
/// response before assuming the chain is circular.
const MAX_DS_STITCHES: u8 = 4;

pub struct Authenticator {
    ctx: QueryContext,
    question: Query,
    config: Arc<ResolverConfig>,
    trust_anchors: Vec<DS>,
    finished: AtomicBool,
    inner: tokio::sync::Mutex<Inner>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

struct Inner {
    /// Responses waiting their turn, keyed by the zone apex label count.
    pending: BTreeMap<usize, (Arc<dyn SignerZone>, Message)>,
    /// The next label count eligible for streaming processing.
    cursor: usize,
    accepted: HashSet<Name>,
    results: Vec<ZoneResult>,
    errors: Vec<ResolverError>,
}

impl Authenticator {
    pub fn new(ctx: QueryContext, question: Query, config: Arc<ResolverConfig>) -> Self {
        Self {
            ctx,
            question,
            config,
            trust_anchors: root_trust_anchors(),
            finished: AtomicBool::new(false),
            inner: tokio::sync::Mutex::new(Inner {
                pending: BTreeMap::new(),
                cursor: 0,
                accepted: HashSet::new(),
                results: Vec::new(),
                errors: Vec::new(),
            }),
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Substitutes the trust anchors the chain is rooted in.
    pub fn with_trust_anchors(mut self, anchors: Vec<DS>) -> Self {
        self.trust_anchors = anchors;
        self
    }

    /// Accepts one zone's response into the chain. Out-of-order arrivals
    /// are buffered; everything that has become contiguous from the root
    /// is processed before this returns.
    pub async fn add_response(
        &self,
        zone: Arc<dyn SignerZone>,
        msg: Message,
    ) -> Result<(), ResolverError> {
        if self.finished.load(Ordering::Acquire) {
            return Ok(());
        }

        let zone_name = canonical_name(zone.name());
        let qname = canonical_name(self.question.name());

        if !zone_name.zone_of(&qname) {
            return Err(ResolverError::NotSubdomain {
                parent: zone_name,
                child: qname,
            });
        }

        if let Some(question) = msg.queries().first() {
            let question_name = canonical_name(question.name());
            if !question_name.zone_of(&qname) && question_name != qname {
                return Err(ResolverError::SignerNameNotParentOfQName {
                    signer: question_name,
                    qname,
                });
            }
        }

        let mut inner = self.inner.lock().await;

        if !inner.accepted.insert(zone_name.clone()) {
            return Err(ResolverError::DuplicateInputForZone(zone_name));
        }

        let slot = zone_name.num_labels() as usize;
        inner.pending.insert(slot, (zone, msg));

        self.drain_contiguous(&mut inner).await;
        Ok(())
    }

    /// Fetches the DS rrset for `qname` from `zone` (its parent) in the
    /// background and feeds the response into the chain. Used to prime
    /// links for zones the walk will skip because they're already known.
    pub fn add_delegation_signer_link(self: &Arc<Self>, zone: Arc<Zone>, qname: &Name) {
        if self.finished.load(Ordering::Acquire) {
            return;
        }

        let auth = Arc::clone(self);
        let qname = canonical_name(qname);

        let handle = tokio::spawn(async move {
            // The child's keys will be wanted shortly; warm that cache in
            // parallel with the DS fetch.
            let prefetch = Arc::clone(&zone);
            let prefetch_ctx = auth.ctx.clone();
            tokio::spawn(async move {
                let _ = prefetch.dnskeys(&prefetch_ctx).await;
            });

            let signer: Arc<dyn SignerZone> = Arc::new(ZoneSigner::new(zone));
            match signer.lookup_ds(&auth.ctx, &qname).await {
                Ok(Some(msg)) => {
                    if let Err(e) = auth.add_response(signer, msg).await {
                        debug!(qname = %qname, error = %e, "delegation signer link rejected");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(qname = %qname, error = %e, "delegation signer lookup failed");
                }
            }
        });

        self.tasks.lock().expect("task list lock").push(handle);
    }

    async fn drain_contiguous(&self, inner: &mut Inner) {
        loop {
            let cursor = inner.cursor;
            let Some((zone, msg)) = inner.pending.remove(&cursor) else {
                break;
            };
            self.process(inner, zone, msg).await;
            inner.cursor = cursor + 1;
        }
    }

    async fn process(&self, inner: &mut Inner, zone: Arc<dyn SignerZone>, msg: Message) {
        if let Err(e) = self.process_chain(inner, zone, msg, 0).await {
            debug!(trace = %self.ctx.trace.short_id(), error = %e, "error processing response");
            if let Some(last) = inner.results.last_mut() {
                if last.err.is_none() {
                    last.err = Some(e.clone());
                }
            }
            inner.errors.push(e);
        }
    }

    /// Validates a response against the chain so far and verifies it.
    ///
    /// When a nameserver hosts several zones it can answer for a child
    /// without ever sending the intermediate delegation; the signer name
    /// on the RRSIGs betrays that (`co.uk.` signing what we took for a
    /// `uk.` response). The missing DS rrset is fetched from the same
    /// servers and verified first, then the original response is retried
    /// under the skipped zone's name.
    fn process_chain<'a>(
        &'a self,
        inner: &'a mut Inner,
        zone: Arc<dyn SignerZone>,
        msg: Message,
        depth: u8,
    ) -> Pin<Box<dyn Future<Output = Result<(), ResolverError>> + Send + 'a>> {
        Box::pin(async move {
            if depth > MAX_DS_STITCHES {
                return Err(ResolverError::DsLookupLoop);
            }

            let zone_name = canonical_name(zone.name());
            let qname = canonical_name(self.question.name());

            let last_ds: Vec<DS> = match inner.results.last() {
                Some(last) => last.ds_records.clone(),
                None => self.trust_anchors.clone(),
            };

            if let Err(err) = Self::audit_signer_names(&zone_name, &msg, &last_ds) {
                let ResolverError::MissingDsRecord(signer) = err else {
                    return Err(err);
                };

                if !signer.zone_of(&qname) {
                    return Err(ResolverError::SignerNameNotParentOfQName { signer, qname });
                }

                let ds_msg = zone
                    .lookup_ds(&self.ctx, &signer)
                    .await
                    .ok()
                    .flatten()
                    .ok_or_else(|| ResolverError::UnableToFetchDsRecord(signer.clone()))?;

                self.process_chain(&mut *inner, Arc::clone(&zone), ds_msg, depth + 1)
                    .await?;

                let wrapped: Arc<dyn SignerZone> =
                    Arc::new(WrappedZone::new(signer, Arc::clone(&zone)));
                return self
                    .process_chain(&mut *inner, wrapped, msg, depth + 1)
                    .await;
            }

            if let Some(last) = inner.results.last() {
                if last.zone_name == zone_name {
                    return Err(ResolverError::SameName(zone_name));
                }
                if !last.zone_name.zone_of(&zone_name) {
                    return Err(ResolverError::NotSubdomain {
                        parent: last.zone_name.clone(),
                        child: zone_name,
                    });
                }
            }

            let mut result =
                verify_response(&self.ctx, &zone, &msg, &last_ds, &self.config).await;
            if result.state == AuthState::Unknown && result.err.is_none() {
                // If we can't tell by now, fail safe.
                result.state = AuthState::Bogus;
            }
            inner.results.push(result);
            Ok(())
        })
    }

    /// Checks that every RRSIG in the message was produced by the zone it
    /// supposedly came from. A single consistent foreign signer means a
    /// delegation was elided and its DS rrset is missing from the chain;
    /// that's only actionable while the chain still carries DS records —
    /// once a link has gone insecure there is nothing to splice against.
    fn audit_signer_names(
        zone_name: &Name,
        msg: &Message,
        last_ds: &[DS],
    ) -> Result<(), ResolverError> {
        let mut mismatch: Option<Name> = None;

        for section in [msg.answers(), msg.name_servers()] {
            for record in section {
                let hickory_proto::rr::RData::DNSSEC(
                    hickory_proto::dnssec::rdata::DNSSECRData::RRSIG(rrsig),
                ) = record.data()
                else {
                    continue;
                };
                let signer = canonical_name(rrsig.signer_name());
                if let Some(expected) = &mismatch {
                    if signer != *expected {
                        return Err(ResolverError::MultipleVaryingSignerNames(
                            expected.clone(),
                            signer,
                        ));
                    }
                } else if signer != *zone_name {
                    mismatch = Some(signer);
                }
            }
        }

        match mismatch {
            Some(signer) if !last_ds.is_empty() => {
                Err(ResolverError::MissingDsRecord(signer))
            }
            _ => Ok(()),
        }
    }

    /// Waits for outstanding delegation-signer work, flushes whatever is
    /// still buffered (in label order, skipping slots that never filled),
    /// and renders the final verdict for the chain.
    pub async fn result(&self) -> (AuthState, DoeState, Option<ResolverError>) {
        self.finished.store(true, Ordering::Release);

        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.tasks.lock().expect("task list lock"));
        for handle in handles {
            let _ = handle.await;
        }

        let mut inner = self.inner.lock().await;

        let remaining: Vec<(Arc<dyn SignerZone>, Message)> = {
            let pending = std::mem::take(&mut inner.pending);
            pending.into_values().collect()
        };
        for (zone, msg) in remaining {
            self.process(&mut inner, zone, msg).await;
        }

        self.verdict(&inner)
    }

    fn verdict(&self, inner: &Inner) -> (AuthState, DoeState, Option<ResolverError>) {
        let results = &inner.results;

        if results.is_empty() {
            let err = inner
                .errors
                .first()
                .cloned()
                .unwrap_or(ResolverError::NoResults);
            return (AuthState::Unknown, DoeState::NotFound, Some(err));
        }

        // Any bogus link poisons the whole chain.
        for result in results {
            if result.state == AuthState::Bogus {
                return (AuthState::Bogus, DoeState::NotFound, result.err.clone());
            }
        }

        // A chain that stops being Secure part-way needs the last secure
        // link to have denied the existence of the next DS.
        for (i, result) in results.iter().enumerate() {
            if result.state == AuthState::Secure {
                continue;
            }
            if i == 0 {
                return (result.state, result.doe, result.err.clone());
            }

            let previous = &results[i - 1];
            return match previous.doe {
                DoeState::Nsec3OptOut | DoeState::NsecMissingDs | DoeState::Nsec3MissingDs => {
                    (AuthState::Insecure, previous.doe, result.err.clone())
                }
                DoeState::NsecNoData | DoeState::Nsec3NoData => {
                    // A NODATA proof only severs the chain legitimately if
                    // it was the answer to our own DS probe at this apex.
                    let asked_for_ds = previous
                        .question
                        .as_ref()
                        .map(|q| {
                            q.query_type() == RecordType::DS
                                && canonical_name(q.name()) == result.zone_name
                        })
                        .unwrap_or(false);
                    if asked_for_ds {
                        (AuthState::Insecure, previous.doe, result.err.clone())
                    } else {
                        (AuthState::Bogus, previous.doe, result.err.clone())
                    }
                }
                _ => (AuthState::Bogus, previous.doe, result.err.clone()),
            };
        }

        // Every link was Secure; the last one decides.
        let last = results.last().expect("results checked non-empty");

        match last.doe {
            DoeState::Nsec3OptOut => (AuthState::Insecure, last.doe, last.err.clone()),
            DoeState::NsecNxDomain
            | DoeState::Nsec3NxDomain
            | DoeState::NsecNoData
            | DoeState::Nsec3NoData
            | DoeState::NsecMissingDs
            | DoeState::Nsec3MissingDs => (AuthState::Secure, last.doe, last.err.clone()),
            DoeState::NotFound | DoeState::NsecWildcard | DoeState::Nsec3Wildcard => {
                // A positive answer: no SOA, and the question actually
                // answered (directly or via CNAME).
                let answered = last
                    .msg
                    .as_ref()
                    .map(|msg| {
                        let qname = self.question.name();
                        let qtype = self.question.query_type();
                        !records_of_type_exist(msg.name_servers(), RecordType::SOA)
                            && (!extract_records_of_name_and_type(msg.answers(), qname, qtype)
                                .is_empty()
                                || !extract_records_of_name_and_type(
                                    msg.answers(),
                                    qname,
                                    RecordType::CNAME,
                                )
                                .is_empty())
                    })
                    .unwrap_or(false);

                if answered {
                    (AuthState::Secure, last.doe, last.err.clone())
                } else {
                    (AuthState::Bogus, last.doe, last.err.clone())
                }
            }
        }
    }
}
