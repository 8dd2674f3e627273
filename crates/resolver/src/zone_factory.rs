use crate::answer_cache::AnswerCache;
use crate::context::QueryContext;
use crate::ipv6;
use crate::pool::{NameserverPool, PoolStatus};
use crate::response::Exchange;
use crate::transport::TransportFactory;
use crate::zone::Zone;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, Record, RecordType};
use rootward_domain::record::{canonical_name, is_strict_subdomain};
use rootward_domain::{ResolverConfig, ResolverError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const ENRICHMENT_TIMEOUT: Duration = Duration::from_secs(3);

/// Builds a zone from a delegation's NS records and glue. Depending on how
/// much glue the parent handed over, the pool may need addresses resolved
/// before (or while) the zone is used.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn create_zone(
    ctx: &QueryContext,
    name: &Name,
    parent: &Name,
    nameservers: &[Record],
    glue: &[Record],
    exchanger: Arc<dyn Exchange>,
    transports: Arc<dyn TransportFactory>,
    config: Arc<ResolverConfig>,
    answer_cache: Option<Arc<dyn AnswerCache>>,
) -> Result<Arc<Zone>, ResolverError> {
    let name = canonical_name(name);
    let parent = canonical_name(parent);

    if name == parent || !is_strict_subdomain(&parent, &name) {
        return Err(ResolverError::FailedCreatingZoneAndPool {
            zone: name,
            reason: format!("[{parent}] does not delegate it"),
        });
    }

    let pool = Arc::new(NameserverPool::new(
        nameservers,
        glue,
        transports,
        Arc::clone(&config),
    ));

    match pool.status() {
        PoolStatus::Primed => {}
        PoolStatus::PrimedButNeedsEnhancing => {
            if !config.lazy_enrichment {
                let pool = Arc::clone(&pool);
                let zone_name = name.clone();
                let ctx = ctx.clone();
                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    if let Err(e) =
                        enrich_pool(&ctx, &zone_name, &pool, exchanger, &config).await
                    {
                        warn!(zone = %zone_name, error = %e, "background pool enrichment failed");
                    }
                });
            }
        }
        PoolStatus::HasHostnamesButNoIpAddresses => {
            enrich_pool(ctx, &name, &pool, exchanger, &config).await?;
        }
        PoolStatus::Empty => {
            return Err(ResolverError::FailedCreatingZoneAndPool {
                zone: name,
                reason: "the nameserver pool is empty and there are no hostnames to enrich"
                    .to_string(),
            });
        }
    }

    debug!(zone = %name, parent = %parent, "new zone created");

    Ok(Arc::new(Zone::new(
        name,
        Some(parent),
        pool,
        answer_cache,
        config,
    )))
}

/// Resolves addresses for a pool's pending hostnames through the resolver
/// itself. Succeeds as soon as the pool is usable; gives the whole affair
/// three seconds.
pub(crate) async fn enrich_pool(
    ctx: &QueryContext,
    zone_name: &Name,
    pool: &Arc<NameserverPool>,
    exchanger: Arc<dyn Exchange>,
    config: &ResolverConfig,
) -> Result<(), ResolverError> {
    let mut hosts = pool.hosts_without_addresses();
    if hosts.is_empty() {
        return Err(ResolverError::FailedEnrichingPool {
            zone: zone_name.clone(),
            reason: "no hostnames left to resolve".to_string(),
        });
    }
    hosts.truncate(config.desired_nameservers_per_zone);

    let mut types = Vec::with_capacity(2);
    if ipv6::available() {
        types.push(RecordType::AAAA);
    }
    types.push(RecordType::A);

    let attempt = async {
        for rtype in &types {
            for host in &hosts {
                let mut msg =
                    Message::new();
                msg.set_id(fastrand::u16(..));
                msg.set_message_type(MessageType::Query);
                msg.set_op_code(OpCode::Query);
                msg.set_recursion_desired(false);
                msg.add_query(Query::query(host.clone(), *rtype));

                let response = exchanger.exchange(ctx, &msg).await;
                let Some(rmsg) = response.msg.as_ref() else {
                    continue;
                };
                if response.has_error() {
                    continue;
                }

                pool.enrich(rmsg.answers());

                if matches!(
                    pool.status(),
                    PoolStatus::Primed | PoolStatus::PrimedButNeedsEnhancing
                ) {
                    return true;
                }
            }
        }
        false
    };

    match tokio::time::timeout(ENRICHMENT_TIMEOUT, attempt).await {
        Ok(true) => {
            debug!(zone = %zone_name, "nameserver pool enriched");
            Ok(())
        }
        Ok(false) => Err(ResolverError::FailedEnrichingPool {
            zone: zone_name.clone(),
            reason: "pool still not primed after enrichment".to_string(),
        }),
        Err(_) => Err(ResolverError::FailedEnrichingPool {
            zone: zone_name.clone(),
            reason: "enrichment timeout".to_string(),
        }),
    }
}
