use crate::zone::Zone;
use hickory_proto::rr::Name;
use rootward_domain::record::canonical_name;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe map of canonical apex name to zone, plus reconstruction of
/// the chain of zones we already know between a query name and the root.
#[derive(Default)]
pub struct ZoneStore {
    zones: RwLock<HashMap<Name, Arc<Zone>>>,
}

impl ZoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The zone for `name`, unless its pool has expired. Expired entries
    /// are left in place — they're about to be replaced by whoever asked.
    pub fn get(&self, name: &Name) -> Option<Arc<Zone>> {
        let zones = self.zones.read().expect("zone store lock");
        let zone = zones.get(&canonical_name(name))?;
        if zone.expired() {
            return None;
        }
        Some(Arc::clone(zone))
    }

    pub fn add(&self, zone: Arc<Zone>) {
        let mut zones = self.zones.write().expect("zone store lock");
        zones.insert(zone.name().clone(), zone);
    }

    pub fn count(&self) -> usize {
        self.zones.read().expect("zone store lock").len()
    }

    /// The zones already known along `qname`, most specific first, always
    /// ending with the root. The chain must be unbroken: each zone's parent
    /// must be the next entry. The first gap (missing, expired, or
    /// mis-parented) truncates it, so a missing link collapses the result
    /// to just the root.
    pub fn zone_list(&self, qname: &Name) -> Vec<Arc<Zone>> {
        let qname = canonical_name(qname);

        let Some(root) = self.get(&Name::root()) else {
            return Vec::new();
        };

        let mut chain = vec![root];

        for labels in 1..=qname.num_labels() as usize {
            let ancestor = qname.trim_to(labels);
            let Some(zone) = self.get(&ancestor) else {
                break;
            };
            let parented = zone
                .parent()
                .map(|p| p == chain[chain.len() - 1].name())
                .unwrap_or(false);
            if !parented {
                break;
            }
            chain.push(zone);
        }

        chain.reverse();
        chain
    }
}
