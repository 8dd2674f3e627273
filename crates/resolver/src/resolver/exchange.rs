//! The label-by-label resolution engine.

use super::Resolver;
use crate::context::QueryContext;
use crate::dnssec::types::{SignerZone, ZoneSigner};
use crate::dnssec::Authenticator;
use crate::response::{Exchange, Response};
use crate::walker::DomainWalker;
use crate::zone::Zone;
use crate::zone_factory;
use hickory_proto::op::Message;
use hickory_proto::rr::{Name, RecordType};
use rootward_domain::record::{
    canonical_name, extract_records_of_type, is_do_set, is_strict_subdomain,
    records_of_type_exist,
};
use rootward_domain::ResolverError;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

enum LabelOutcome {
    /// The zone delegated; continue the walk from the new zone.
    Delegated(Arc<Zone>),
    /// A terminal response (answer, NXDOMAIN, or failure) — we're done.
    Done(Response),
}

impl Resolver {
    /// The internal entry point: shared by the public API, CNAME
    /// follow-ups and pool enrichment, all of which ride the same context
    /// (and therefore the same loop-guard counter).
    pub(crate) async fn resolve(&self, ctx: &QueryContext, qmsg: Message) -> Response {
        ctx.trace.next_iteration();

        let Some(question) = qmsg.queries().first().cloned() else {
            return Response::from_error(ResolverError::NilMessageSentToExchange {
                zone: ctx.zone_label(),
            });
        };
        let qname = canonical_name(question.name());

        // With DO set the caller wants the chain of trust proven alongside
        // the answer.
        let auth = if is_do_set(&qmsg) {
            Some(Arc::new(
                Authenticator::new(ctx.clone(), question.clone(), Arc::clone(&self.config))
                    .with_trust_anchors(self.trust_anchors.clone()),
            ))
        } else {
            None
        };

        // Zones we already have nameservers for, most specific first. The
        // walk starts from the deepest one; the DS proofs between them are
        // fetched in parallel while the walk proceeds.
        let known = self.zones.zone_list(&qname);
        let Some(deepest) = known.first() else {
            return Response::from_error(ResolverError::InternalError(
                "the zone store has lost the root".to_string(),
            ));
        };

        if let Some(auth) = &auth {
            for pair in known.windows(2) {
                let (child, parent) = (&pair[0], &pair[1]);
                auth.add_delegation_signer_link(Arc::clone(parent), child.name());
            }
        }

        let mut walker = DomainWalker::new(&qname);
        if let Err(e) = walker.wind_to(deepest.name()) {
            return Response::from_error(e);
        }

        let mut zone = Arc::clone(deepest);

        while walker.more() {
            let session = ctx.session_queries.fetch_add(1, Ordering::Relaxed) + 1;
            if session > self.config.max_queries_per_request {
                return Response::from_error(ResolverError::MaxQueriesPerRequestReached);
            }

            // A zone we created on an earlier query may already cover the
            // current name; re-use it unless this is the final label (the
            // question still has to be asked).
            if !walker.last() {
                if let Some(next) = self.zones.get(&walker.current()) {
                    zone = next;
                    walker.next();
                    continue;
                }
            }

            match self
                .resolve_label(ctx, &mut walker, zone, &qmsg, auth.as_ref())
                .await
            {
                LabelOutcome::Delegated(next) => {
                    zone = next;
                    walker.next();
                }
                LabelOutcome::Done(response) => return response,
            }
        }

        Response::from_error(ResolverError::UnableToResolveAnswer {
            qname,
            zone: None,
            source: None,
        })
    }

    async fn resolve_label(
        &self,
        ctx: &QueryContext,
        walker: &mut DomainWalker,
        zone: Arc<Zone>,
        qmsg: &Message,
        auth: Option<&Arc<Authenticator>>,
    ) -> LabelOutcome {
        if auth.is_some() {
            // The validator will want this zone's keys; warm the cache
            // while the real question is in flight.
            let prefetch = Arc::clone(&zone);
            let prefetch_ctx = ctx.clone();
            tokio::spawn(async move {
                let _ = prefetch.dnskeys(&prefetch_ctx).await;
            });
        }

        let mut response = zone.exchange(ctx, qmsg).await;

        if let Some(msg) = response.msg.as_mut() {
            msg.set_recursion_available(true);
        }
        if response.has_error() {
            return LabelOutcome::Done(response);
        }
        if response.is_empty() {
            return LabelOutcome::Done(Response::from_error(ResolverError::InternalError(
                "the exchange returned nothing, without an error".to_string(),
            )));
        }

        let Some(rmsg) = response.msg.take() else {
            return LabelOutcome::Done(response);
        };

        let zone = self
            .check_for_missing_zones(ctx, walker, zone, &rmsg, auth)
            .await;

        if let Some(auth) = auth {
            let signer: Arc<dyn SignerZone> = Arc::new(ZoneSigner::new(Arc::clone(&zone)));
            if let Err(e) = auth.add_response(signer, rmsg.clone()).await {
                debug!(zone = %zone.name(), error = %e, "response not accepted for authentication");
            }
        }

        let delegating = rmsg.answers().is_empty()
            && records_of_type_exist(rmsg.name_servers(), RecordType::NS)
            && !records_of_type_exist(rmsg.name_servers(), RecordType::SOA);

        if delegating {
            match self.process_delegation(ctx, &zone, &rmsg).await {
                Ok(next) => LabelOutcome::Delegated(next),
                Err(e) => LabelOutcome::Done(Response::from_error(e)),
            }
        } else {
            response.msg = Some(rmsg);
            LabelOutcome::Done(self.finalise_response(ctx, auth, qmsg, response).await)
        }
    }

    /// A nameserver that hosts both a parent and a child zone can answer
    /// for the child without ever sending the intermediate delegation.
    /// When the owner names in a response sit more than one label below
    /// the zone we asked, probe the gap for a SOA: a hit means the
    /// intermediate name is a real zone served by the same pool, and the
    /// chain of trust needs its DS records.
    async fn check_for_missing_zones(
        &self,
        ctx: &QueryContext,
        walker: &mut DomainWalker,
        zone: Arc<Zone>,
        rmsg: &Message,
        auth: Option<&Arc<Authenticator>>,
    ) -> Arc<Zone> {
        let mut owner: Option<Name> = None;
        for record in rmsg.name_servers().iter().chain(rmsg.answers().iter()) {
            let name = canonical_name(record.name());
            if !is_strict_subdomain(zone.name(), &name) {
                continue;
            }
            let deeper = owner
                .as_ref()
                .map(|o| name.num_labels() > o.num_labels())
                .unwrap_or(true);
            if deeper {
                owner = Some(name);
            }
        }

        let Some(owner) = owner else {
            return zone;
        };

        let mut current = zone;
        let mut created = false;

        for missing in walker.gap(&owner) {
            if !created {
                match current.soa(ctx, &missing).await {
                    Ok(Some(_)) => {
                        debug!(zone = %missing, parent = %current.name(), "skipped zone discovered");
                        let discovered =
                            Arc::new(current.clone_as(&missing, current.name()));
                        if let Some(auth) = auth {
                            auth.add_delegation_signer_link(Arc::clone(&current), &missing);
                        }
                        self.zones.add(Arc::clone(&discovered));
                        current = discovered;
                        created = true;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!(name = %missing, error = %e, "soa probe failed");
                    }
                }
            }

            // Skipped either way; the walk resumes below the gap.
            walker.next();
        }

        current
    }

    async fn process_delegation(
        &self,
        ctx: &QueryContext,
        zone: &Arc<Zone>,
        rmsg: &Message,
    ) -> Result<Arc<Zone>, ResolverError> {
        let ns_records = extract_records_of_type(rmsg.name_servers(), RecordType::NS);
        if ns_records.is_empty() {
            return Err(ResolverError::NextNameserversNotFound);
        }

        let next_zone_name = canonical_name(ns_records[0].name());
        if !is_strict_subdomain(zone.name(), &next_zone_name) {
            return Err(ResolverError::NextNameserversNotFound);
        }

        let new_zone = zone_factory::create_zone(
            ctx,
            &next_zone_name,
            zone.name(),
            &ns_records,
            rmsg.additionals(),
            self.exchanger()?,
            Arc::clone(&self.transports),
            Arc::clone(&self.config),
            self.answer_cache.clone(),
        )
        .await?;

        self.zones.add(Arc::clone(&new_zone));
        Ok(new_zone)
    }
}
