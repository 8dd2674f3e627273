use crate::dnssec::types::SignatureRecord;
use hickory_proto::dnssec::rdata::{DNSSECRData, NSEC};
use hickory_proto::rr::{Name, RData, RecordType};
use rootward_domain::record::{canonical_name, wildcard_name};
use std::cmp::Ordering;

/// The NSEC records of a response, with span arithmetic over the zone's
/// canonical ordering.
pub(crate) struct NsecProofs {
    zone: Name,
    records: Vec<(Name, NSEC)>,
}

impl NsecProofs {
    pub(crate) fn from_signatures(zone: &Name, signatures: &[SignatureRecord]) -> Self {
        let records = signatures
            .iter()
            .filter(|sig| sig.rtype == RecordType::NSEC)
            .filter_map(|sig| sig.rrset.first())
            .filter_map(|record| match record.data() {
                RData::DNSSEC(DNSSECRData::NSEC(nsec)) => {
                    Some((canonical_name(record.name()), nsec.clone()))
                }
                _ => None,
            })
            .collect();

        Self {
            zone: canonical_name(zone),
            records,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Looks for an NSEC owned by `name` and reports whether any of
    /// `types` is present in its type bit map.
    pub(crate) fn type_bit_map_contains_any_of(
        &self,
        name: &Name,
        types: &[RecordType],
    ) -> (bool, bool) {
        let name = canonical_name(name);
        let mut name_seen = false;

        for (owner, nsec) in &self.records {
            if *owner != name {
                continue;
            }
            name_seen = true;
            if types
                .iter()
                .any(|t| nsec.type_bit_maps().any(|bt| bt == *t))
            {
                return (true, true);
            }
        }

        (name_seen, false)
    }

    /// Is `name` inside any NSEC span `[owner, next)`? The final NSEC of a
    /// zone points back at the apex, which closes the span on the right
    /// (RFC 4034 §4.1.1).
    fn covers(&self, name: &Name) -> bool {
        let name = canonical_name(name);

        for (owner, nsec) in &self.records {
            let next = canonical_name(nsec.next_domain_name());
            let after_owner = canonical_cmp(owner, &name) == Ordering::Less;
            let before_next =
                next == self.zone || canonical_cmp(&name, &next) == Ordering::Less;
            if after_owner && before_next {
                return true;
            }
        }

        false
    }

    /// NXDOMAIN proof: both the name and the wildcard at its immediate
    /// ancestor fall in covered spans.
    pub(crate) fn qname_does_not_exist(&self, qname: &Name) -> bool {
        self.covers(qname) && self.covers(&wildcard_name(qname))
    }

    /// Wildcard-expansion proof: the specific name is covered (so it does
    /// not exist) but the wildcard itself is not denied.
    pub(crate) fn expanded_wildcard_proof(&self, qname: &Name) -> bool {
        self.covers(qname) && !self.covers(&wildcard_name(qname))
    }
}

/// Canonical DNS name ordering (RFC 4034 §6.1): compare labels right to
/// left, case-insensitively, as raw bytes; a name that is a proper prefix
/// of another sorts first.
pub(crate) fn canonical_cmp(a: &Name, b: &Name) -> Ordering {
    let a_labels: Vec<&[u8]> = a.iter().collect();
    let b_labels: Vec<&[u8]> = b.iter().collect();

    for (a_label, b_label) in a_labels.iter().rev().zip(b_labels.iter().rev()) {
        let a_lower = a_label.iter().map(u8::to_ascii_lowercase);
        let b_lower = b_label.iter().map(u8::to_ascii_lowercase);
        match a_lower.cmp(b_lower) {
            Ordering::Equal => {}
            other => return other,
        }
    }

    a_labels.len().cmp(&b_labels.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::Record;
    use std::str::FromStr;

    fn name(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    fn proofs(zone: &str, spans: &[(&str, &str, &[RecordType])]) -> NsecProofs {
        let records = spans
            .iter()
            .map(|(owner, next, types)| {
                (
                    name(owner),
                    NSEC::new(name(next), types.to_vec()),
                )
            })
            .collect();
        NsecProofs {
            zone: name(zone),
            records,
        }
    }

    #[test]
    fn canonical_ordering_follows_rfc_4034() {
        // The example ordering from RFC 4034 §6.1.
        let ordered = [
            "example.",
            "a.example.",
            "yljkjljk.a.example.",
            "Z.a.example.",
            "zABC.a.EXAMPLE.",
            "z.example.",
            "\\001.z.example.",
            "*.z.example.",
        ];
        for pair in ordered.windows(2) {
            assert_eq!(
                canonical_cmp(&name(pair[0]), &name(pair[1])),
                Ordering::Less,
                "{} should sort before {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn span_covers_names_between_owner_and_next() {
        let doe = proofs("example.com.", &[("a.example.com.", "m.example.com.", &[])]);
        assert!(doe.covers(&name("b.example.com.")));
        assert!(!doe.covers(&name("a.example.com.")));
        assert!(!doe.covers(&name("m.example.com.")));
        assert!(!doe.covers(&name("z.example.com.")));
    }

    #[test]
    fn final_span_wraps_to_the_apex() {
        let doe = proofs("example.com.", &[("x.example.com.", "example.com.", &[])]);
        assert!(doe.covers(&name("z.example.com.")));
        assert!(!doe.covers(&name("a.example.com.")));
    }

    #[test]
    fn nxdomain_needs_both_name_and_wildcard_covered() {
        let both = proofs(
            "example.com.",
            &[
                ("m.example.com.", "p.example.com.", &[]),
                ("example.com.", "b.example.com.", &[]),
            ],
        );
        assert!(both.qname_does_not_exist(&name("nope.example.com.")));

        let name_only = proofs("example.com.", &[("m.example.com.", "p.example.com.", &[])]);
        assert!(!name_only.qname_does_not_exist(&name("nope.example.com.")));
        assert!(name_only.expanded_wildcard_proof(&name("nope.example.com.")));
    }

    #[test]
    fn type_bit_map_lookup_distinguishes_name_and_type() {
        let doe = proofs(
            "example.com.",
            &[(
                "child.example.com.",
                "m.example.com.",
                &[RecordType::NS, RecordType::A],
            )],
        );

        let (name_seen, type_seen) =
            doe.type_bit_map_contains_any_of(&name("child.example.com."), &[RecordType::NS]);
        assert!(name_seen && type_seen);

        let (name_seen, type_seen) =
            doe.type_bit_map_contains_any_of(&name("child.example.com."), &[RecordType::DS]);
        assert!(name_seen && !type_seen);

        let (name_seen, _) =
            doe.type_bit_map_contains_any_of(&name("other.example.com."), &[RecordType::NS]);
        assert!(!name_seen);
    }
}
