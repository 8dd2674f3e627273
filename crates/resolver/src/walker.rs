use hickory_proto::rr::Name;
use rootward_domain::record::canonical_name;
use rootward_domain::ResolverError;

/// Ordered traversal of a query name's labels, from the root towards the
/// full name.
///
/// The full name is yielded twice at the end. When the query name is the
/// apex of a zone the first visit resolves the zone's nameservers and the
/// second asks them the actual question.
#[derive(Clone, Debug)]
pub struct DomainWalker {
    name: Name,
    labels: usize,
    position: usize,
}

impl DomainWalker {
    pub fn new(name: &Name) -> Self {
        let name = canonical_name(name);
        Self {
            labels: name.num_labels() as usize,
            name,
            position: 0,
        }
    }

    /// The FQDN from the current label position to the end.
    pub fn current(&self) -> Name {
        self.name.trim_to(self.position.min(self.labels))
    }

    pub fn next(&mut self) {
        self.position += 1;
    }

    /// Whether iteration may continue. The position runs one step past the
    /// label count, which is what yields the full name a second time.
    pub fn more(&self) -> bool {
        self.position <= self.labels + 1
    }

    /// True for the final two positions, both of which yield the full name.
    pub fn last(&self) -> bool {
        self.position >= self.labels
    }

    /// Fast-forward to `target`, which must be an ancestor of the name (or
    /// the name itself).
    pub fn wind_to(&mut self, target: &Name) -> Result<(), ResolverError> {
        let target = canonical_name(target);
        if !target.zone_of(&self.name) {
            return Err(ResolverError::NotSubdomain {
                parent: target,
                child: self.name.clone(),
            });
        }
        self.position = target.num_labels() as usize;
        Ok(())
    }

    /// The names from the current position up to, but excluding, `target`,
    /// shortest first. Empty when `target` is not deeper than the current
    /// position. Used to spot zones a delegation skipped over.
    pub fn gap(&self, target: &Name) -> Vec<Name> {
        let target = canonical_name(target);
        if !target.zone_of(&self.name) {
            return Vec::new();
        }

        let current = self.position.min(self.labels);
        let wanted = target.num_labels() as usize;
        if wanted <= current {
            return Vec::new();
        }

        (current..wanted).map(|n| self.name.trim_to(n)).collect()
    }
}
