//! The bundled root hints, parsed once at resolver construction into the
//! root nameserver pool.

use crate::pool::NameserverPool;
use crate::transport::TransportFactory;
use hickory_proto::rr::Name;
use rootward_domain::ResolverConfig;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

/// Snapshot of the root zone's nameserver addresses (the `named.root`
/// file). These move rarely; a stale entry only costs a retry against a
/// different letter.
const ROOT_HINTS: &str = "\
a.root-servers.net.      3600000  A      198.41.0.4
a.root-servers.net.      3600000  AAAA   2001:503:ba3e::2:30
b.root-servers.net.      3600000  A      170.247.170.2
b.root-servers.net.      3600000  AAAA   2801:1b8:10::b
c.root-servers.net.      3600000  A      192.33.4.12
c.root-servers.net.      3600000  AAAA   2001:500:2::c
d.root-servers.net.      3600000  A      199.7.91.13
d.root-servers.net.      3600000  AAAA   2001:500:2d::d
e.root-servers.net.      3600000  A      192.203.230.10
e.root-servers.net.      3600000  AAAA   2001:500:a8::e
f.root-servers.net.      3600000  A      192.5.5.241
f.root-servers.net.      3600000  AAAA   2001:500:2f::f
g.root-servers.net.      3600000  A      192.112.36.4
g.root-servers.net.      3600000  AAAA   2001:500:12::d0d
h.root-servers.net.      3600000  A      198.97.190.53
h.root-servers.net.      3600000  AAAA   2001:500:1::53
i.root-servers.net.      3600000  A      192.36.148.17
i.root-servers.net.      3600000  AAAA   2001:7fe::53
j.root-servers.net.      3600000  A      192.58.128.30
j.root-servers.net.      3600000  AAAA   2001:503:c27::2:30
k.root-servers.net.      3600000  A      193.0.14.129
k.root-servers.net.      3600000  AAAA   2001:7fd::1
l.root-servers.net.      3600000  A      199.7.83.42
l.root-servers.net.      3600000  AAAA   2001:500:9f::42
m.root-servers.net.      3600000  A      202.12.27.33
m.root-servers.net.      3600000  AAAA   2001:dc3::35
";

/// Parses the embedded hints into `(hostname, address)` pairs.
fn parse_hints(hints: &str) -> Vec<(Name, IpAddr)> {
    let mut servers = Vec::new();
    for line in hints.lines() {
        let mut fields = line.split_whitespace();
        let (Some(host), Some(_ttl), Some(rtype), Some(addr)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if rtype != "A" && rtype != "AAAA" {
            continue;
        }
        let (Ok(host), Ok(addr)) = (Name::from_str(host), IpAddr::from_str(addr)) else {
            continue;
        };
        servers.push((host, addr));
    }
    servers
}

/// The root zone's pool. Never expires.
pub fn root_server_pool(
    factory: Arc<dyn TransportFactory>,
    config: Arc<ResolverConfig>,
) -> NameserverPool {
    NameserverPool::from_addresses(&parse_hints(ROOT_HINTS), factory, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolStatus;
    use crate::transport::SocketTransportFactory;

    #[test]
    fn hints_parse_to_thirteen_letters_in_both_families() {
        let servers = parse_hints(ROOT_HINTS);
        let v4 = servers.iter().filter(|(_, a)| a.is_ipv4()).count();
        let v6 = servers.iter().filter(|(_, a)| a.is_ipv6()).count();
        assert_eq!(v4, 13);
        assert_eq!(v6, 13);
    }

    #[test]
    fn root_pool_is_primed_and_does_not_expire() {
        let pool = root_server_pool(
            Arc::new(SocketTransportFactory),
            Arc::new(ResolverConfig::default()),
        );
        assert_eq!(pool.status(), PoolStatus::Primed);
        assert!(!pool.expired());
    }
}
