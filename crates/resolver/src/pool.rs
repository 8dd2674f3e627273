use crate::context::QueryContext;
use crate::ipv6;
use crate::nameserver::Nameserver;
use crate::response::{Exchange, Response};
use crate::transport::TransportFactory;
use async_trait::async_trait;
use hickory_proto::op::Message;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use rootward_domain::record::canonical_name;
use rootward_domain::{ResolverConfig, ResolverError};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolStatus {
    Empty,
    HasHostnamesButNoIpAddresses,
    PrimedButNeedsEnhancing,
    Primed,
}

/// The set of reachable servers for one zone: IPv4 and IPv6 sub-pools with
/// round-robin selection, the delegated hostnames we have no addresses for
/// yet, and an absolute expiry derived from the delegation TTLs.
pub struct NameserverPool {
    hosts_without_addresses: RwLock<Vec<Name>>,

    ipv4: RwLock<Vec<Arc<Nameserver>>>,
    ipv4_next: AtomicU32,

    ipv6: RwLock<Vec<Arc<Nameserver>>>,
    ipv6_next: AtomicU32,

    /// Seconds since the epoch; 0 means the pool never expires (the root).
    expires: AtomicU64,

    factory: Arc<dyn TransportFactory>,
    config: Arc<ResolverConfig>,
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn find_addresses_for_hostname(
    hostname: &Name,
    records: &[Record],
    max_ttl: u32,
) -> (Vec<IpAddr>, Vec<IpAddr>, u32) {
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    let mut ttl = max_ttl;

    for record in records {
        if canonical_name(record.name()) != *hostname {
            continue;
        }
        match record.data() {
            RData::A(a) => {
                v4.push(IpAddr::V4(a.0));
                ttl = ttl.min(record.ttl());
            }
            RData::AAAA(aaaa) => {
                v6.push(IpAddr::V6(aaaa.0));
                ttl = ttl.min(record.ttl());
            }
            _ => {}
        }
    }

    (v4, v6, ttl)
}

impl NameserverPool {
    /// Builds a pool from a delegation: the NS rrset plus whatever glue the
    /// parent offered. Hostnames without glue go on the enrichment list.
    /// The expiry is the minimum TTL seen across the NS records and the
    /// glue actually used.
    pub fn new(
        nameservers: &[Record],
        glue: &[Record],
        factory: Arc<dyn TransportFactory>,
        config: Arc<ResolverConfig>,
    ) -> Self {
        let pool = Self::empty(factory, config);

        let mut ttl = pool.config.max_allowed_ttl;
        {
            let mut v4 = pool.ipv4.write().expect("pool lock");
            let mut v6 = pool.ipv6.write().expect("pool lock");
            let mut pending = pool.hosts_without_addresses.write().expect("pool lock");

            for record in nameservers {
                let RData::NS(ns) = record.data() else {
                    continue;
                };
                let hostname = canonical_name(&ns.0);
                ttl = ttl.min(record.ttl());

                let (a, aaaa, glue_ttl) =
                    find_addresses_for_hostname(&hostname, glue, pool.config.max_allowed_ttl);

                if a.is_empty() && aaaa.is_empty() {
                    pending.push(hostname);
                    continue;
                }

                ttl = ttl.min(glue_ttl);
                for addr in a {
                    v4.push(Arc::new(pool.nameserver(hostname.clone(), addr)));
                }
                for addr in aaaa {
                    v6.push(Arc::new(pool.nameserver(hostname.clone(), addr)));
                }
            }
        }

        pool.expires
            .store(now_epoch() + u64::from(ttl), Ordering::Release);
        pool
    }

    /// A pool from bare addresses, with no expiry. Used for the root.
    pub fn from_addresses(
        servers: &[(Name, IpAddr)],
        factory: Arc<dyn TransportFactory>,
        config: Arc<ResolverConfig>,
    ) -> Self {
        let pool = Self::empty(factory, config);
        {
            let mut v4 = pool.ipv4.write().expect("pool lock");
            let mut v6 = pool.ipv6.write().expect("pool lock");
            for (hostname, addr) in servers {
                let ns = Arc::new(pool.nameserver(canonical_name(hostname), *addr));
                match addr {
                    IpAddr::V4(_) => v4.push(ns),
                    IpAddr::V6(_) => v6.push(ns),
                }
            }
        }
        pool
    }

    fn empty(factory: Arc<dyn TransportFactory>, config: Arc<ResolverConfig>) -> Self {
        Self {
            hosts_without_addresses: RwLock::new(Vec::new()),
            ipv4: RwLock::new(Vec::new()),
            ipv4_next: AtomicU32::new(0),
            ipv6: RwLock::new(Vec::new()),
            ipv6_next: AtomicU32::new(0),
            expires: AtomicU64::new(0),
            factory,
            config,
        }
    }

    fn nameserver(&self, hostname: Name, addr: IpAddr) -> Nameserver {
        Nameserver::new(
            hostname,
            addr,
            Arc::clone(&self.factory),
            self.config.timeout_udp,
            self.config.timeout_tcp,
        )
    }

    pub fn count_ipv4(&self) -> usize {
        self.ipv4.read().expect("pool lock").len()
    }

    pub fn count_ipv6(&self) -> usize {
        self.ipv6.read().expect("pool lock").len()
    }

    fn has_ipv4(&self) -> bool {
        self.count_ipv4() > 0
    }

    fn has_ipv6(&self) -> bool {
        self.count_ipv6() > 0
    }

    pub fn hosts_without_addresses(&self) -> Vec<Name> {
        self.hosts_without_addresses
            .read()
            .expect("pool lock")
            .clone()
    }

    /// Round-robin pick of the next IPv4 server. The counter races across
    /// concurrent queries; a little drift in the rotation is fine.
    fn next_ipv4(&self) -> Option<Arc<Nameserver>> {
        let servers = self.ipv4.read().expect("pool lock");
        if servers.is_empty() {
            return None;
        }
        let next = self.ipv4_next.load(Ordering::Relaxed) as usize % servers.len();
        self.ipv4_next.store(next as u32 + 1, Ordering::Relaxed);
        Some(Arc::clone(&servers[next]))
    }

    fn next_ipv6(&self) -> Option<Arc<Nameserver>> {
        let servers = self.ipv6.read().expect("pool lock");
        if servers.is_empty() {
            return None;
        }
        let next = self.ipv6_next.load(Ordering::Relaxed) as usize % servers.len();
        self.ipv6_next.store(next as u32 + 1, Ordering::Relaxed);
        Some(Arc::clone(&servers[next]))
    }

    pub fn expired(&self) -> bool {
        let expires = self.expires.load(Ordering::Acquire);
        expires != 0 && expires < now_epoch()
    }

    pub fn status(&self) -> PoolStatus {
        let ipv4 = self.count_ipv4();
        let ipv6 = self.count_ipv6();
        let pending = self.hosts_without_addresses.read().expect("pool lock").len();

        if ipv4 == 0 && ipv6 == 0 && pending == 0 {
            return PoolStatus::Empty;
        }

        let mut usable = ipv4;
        if ipv6::available() {
            usable += ipv6;
        }

        if usable == 0 {
            return PoolStatus::HasHostnamesButNoIpAddresses;
        }

        if usable < self.config.desired_nameservers_per_zone && pending > 0 {
            return PoolStatus::PrimedButNeedsEnhancing;
        }

        PoolStatus::Primed
    }

    /// Folds A/AAAA answers into the pool, resolving hostnames off the
    /// pending list. The expiry only ever moves earlier.
    pub fn enrich(&self, records: &[Record]) {
        if records.is_empty() {
            return;
        }

        let mut v4 = self.ipv4.write().expect("pool lock");
        let mut v6 = self.ipv6.write().expect("pool lock");
        let mut pending = self.hosts_without_addresses.write().expect("pool lock");

        let mut ttl = self.config.max_allowed_ttl;
        let mut still_pending = Vec::with_capacity(pending.len());

        for hostname in pending.iter() {
            let (a, aaaa, seen_ttl) =
                find_addresses_for_hostname(hostname, records, self.config.max_allowed_ttl);

            if a.is_empty() && aaaa.is_empty() {
                still_pending.push(hostname.clone());
                continue;
            }

            ttl = ttl.min(seen_ttl);
            for addr in a {
                v4.push(Arc::new(self.nameserver(hostname.clone(), addr)));
            }
            for addr in aaaa {
                v6.push(Arc::new(self.nameserver(hostname.clone(), addr)));
            }
        }

        let expires = self.expires.load(Ordering::Acquire);
        if expires != 0 {
            let candidate = now_epoch() + u64::from(ttl);
            if candidate < expires {
                self.expires.store(candidate, Ordering::Release);
            }
        }

        *pending = still_pending;
    }
}

#[async_trait]
impl Exchange for NameserverPool {
    async fn exchange(&self, ctx: &QueryContext, msg: &Message) -> Response {
        let has_ipv4 = self.has_ipv4();
        let has_ipv6 = self.has_ipv6();

        if !has_ipv4 && !has_ipv6 {
            return Response::from_error(ResolverError::NoPoolConfiguredForZone(
                ctx.zone_label(),
            ));
        }

        let mut response = Response::default();

        let first = if has_ipv6 && ipv6::available() {
            self.next_ipv6()
        } else {
            self.next_ipv4()
        };
        if let Some(server) = first {
            response = server.exchange(ctx, msg).await;
        }

        if response.is_empty() || response.has_error() || response.truncated() {
            // One more try. With more than one server in the pool, the
            // rotation lands this on a different one.
            let second = if has_ipv4 {
                self.next_ipv4()
            } else {
                self.next_ipv6()
            };
            if let Some(server) = second {
                response = server.exchange(ctx, msg).await;
            }
        }

        if response.is_empty() || response.has_error() {
            let qname = msg
                .queries()
                .first()
                .map(|q| q.name().clone())
                .unwrap_or_else(Name::root);

            response.err = Some(match response.err.take() {
                Some(err) => err.wrap_unable_to_resolve(qname, ctx.zone_name.clone()),
                None => ResolverError::UnableToResolveAnswer {
                    qname,
                    zone: ctx.zone_name.clone(),
                    source: None,
                },
            });
        }

        response
    }
}
