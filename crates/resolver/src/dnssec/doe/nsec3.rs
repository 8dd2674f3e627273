use crate::dnssec::crypto::name_wire;
use crate::dnssec::types::SignatureRecord;
use data_encoding::BASE32_DNSSEC;
use hickory_proto::dnssec::rdata::{DNSSECRData, NSEC3};
use hickory_proto::dnssec::Nsec3HashAlgorithm;
use hickory_proto::rr::{Name, RData, RecordType};
use rootward_domain::record::canonical_name;

/// An NSEC3 record with its owner hash already decoded out of the owner
/// name's first label.
struct Nsec3Record {
    owner_hash: Vec<u8>,
    rdata: NSEC3,
}

/// The NSEC3 records of a response, hashed-name matching and covering, and
/// the closest-encloser machinery of RFC 5155.
pub(crate) struct Nsec3Proofs {
    zone: Name,
    records: Vec<Nsec3Record>,
}

impl Nsec3Proofs {
    /// Records with an unknown hash algorithm or unexpected flags must be
    /// ignored (RFC 5155 §8.2); hickory's decoder only admits SHA-1 and
    /// the opt-out bit, so the remaining filter is an undecodable owner.
    pub(crate) fn from_signatures(zone: &Name, signatures: &[SignatureRecord]) -> Self {
        let records = signatures
            .iter()
            .filter(|sig| sig.rtype == RecordType::NSEC3)
            .filter_map(|sig| sig.rrset.first())
            .filter_map(|record| match record.data() {
                RData::DNSSEC(DNSSECRData::NSEC3(nsec3)) => {
                    if !matches!(nsec3.hash_algorithm(), Nsec3HashAlgorithm::SHA1) {
                        return None;
                    }
                    let owner_hash = owner_hash(record.name())?;
                    Some(Nsec3Record {
                        owner_hash,
                        rdata: nsec3.clone(),
                    })
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

    fn matches(&self, record: &Nsec3Record, name: &Name) -> bool {
        hash_name(name, record.rdata.salt(), record.rdata.iterations()) == record.owner_hash
    }

    /// Covering, not matching: the hash falls strictly between the owner
    /// hash and the next hashed owner, allowing for the wrap at the end of
    /// the hash ring.
    fn covers(&self, record: &Nsec3Record, name: &Name) -> bool {
        let hash = hash_name(name, record.rdata.salt(), record.rdata.iterations());
        let owner = record.owner_hash.as_slice();
        let next = record.rdata.next_hashed_owner_name();

        if owner < next {
            owner < hash.as_slice() && hash.as_slice() < next
        } else {
            // Last record in the ring.
            owner < hash.as_slice() || hash.as_slice() < next
        }
    }

    pub(crate) fn type_bit_map_contains_any_of(
        &self,
        name: &Name,
        types: &[RecordType],
    ) -> (bool, bool) {
        let mut name_seen = false;

        for record in &self.records {
            if !self.matches(record, name) {
                continue;
            }
            name_seen = true;
            if types
                .iter()
                .any(|t| record.rdata.type_bit_maps().any(|bt| bt == *t))
            {
                return (true, true);
            }
        }

        (name_seen, false)
    }

    /// The longest existing ancestor of `qname` proven by a matching
    /// NSEC3, plus the next closer name. Owners carrying DNAME, or NS
    /// without SOA, can't stand as the closest encloser (RFC 7129 §5.5) —
    /// they belong to another zone's side of a cut.
    pub(crate) fn closest_encloser(&self, qname: &Name) -> Option<(Name, Name)> {
        let qname = canonical_name(qname);
        let labels = qname.num_labels() as usize;

        let mut contender: Option<(Name, Name)> = None;

        for record in &self.records {
            let mut last = qname.clone();
            for count in (0..=labels).rev() {
                let candidate = qname.trim_to(count);
                if !self.zone.zone_of(&candidate) {
                    break;
                }
                if self.matches(record, &candidate) {
                    let bit_maps: Vec<RecordType> = record.rdata.type_bit_maps().collect();
                    if bit_maps.contains(&RecordType::Unknown(39)) {
                        continue;
                    }
                    if bit_maps.contains(&RecordType::NS)
                        && !bit_maps.contains(&RecordType::SOA)
                    {
                        continue;
                    }

                    let deeper = contender
                        .as_ref()
                        .map(|(ce, _)| candidate.num_labels() > ce.num_labels())
                        .unwrap_or(true);
                    if deeper {
                        contender = Some((candidate, last.clone()));
                    }
                    break;
                }
                last = candidate;
            }
        }

        contender
    }

    /// The full RFC 5155 §8.4 dance: a matched closest encloser, a covered
    /// next closer name (noting opt-out), and a covered wildcard.
    pub(crate) fn closest_encloser_proof(&self, name: &Name) -> ClosestEncloserProof {
        let Some((closest_encloser, next_closer)) = self.closest_encloser(name) else {
            return ClosestEncloserProof::default();
        };

        let wildcard = self.wildcard_covered(&closest_encloser);
        let (opted_out, next_closer_covered) = self.next_closer_covered(&next_closer);

        ClosestEncloserProof {
            closest_encloser: true,
            next_closer: next_closer_covered,
            wildcard,
            opted_out,
        }
    }

    /// Proof for a wildcard-expanded positive answer (RFC 5155 §8.8): the
    /// next closer name of the wildcard's immediate ancestor must be
    /// covered, and nothing may deny the wildcard itself. The ancestor
    /// falls straight out of the RRSIG label count.
    pub(crate) fn expanded_wildcard_proof(&self, owner: &Name, rrsig_labels: u8) -> bool {
        let owner = canonical_name(owner);
        let closest_encloser = owner.trim_to(usize::from(rrsig_labels));
        let next_closer = owner.trim_to(usize::from(rrsig_labels) + 1);

        let wildcard_denied = self.wildcard_covered(&closest_encloser);
        let (_, next_closer_covered) = self.next_closer_covered(&next_closer);

        !wildcard_denied && next_closer_covered
    }

    fn wildcard_covered(&self, closest_encloser: &Name) -> bool {
        let wildcard = Name::from_ascii("*")
            .and_then(|star| star.append_domain(closest_encloser));
        let Ok(wildcard) = wildcard else {
            return false;
        };

        let mut covered = false;
        for record in &self.records {
            if self.matches(record, &wildcard) {
                return false;
            }
            if self.covers(record, &wildcard) {
                covered = true;
            }
        }
        covered
    }

    fn next_closer_covered(&self, next_closer: &Name) -> (bool, bool) {
        let mut opted_out = false;
        let mut covered = false;

        for record in &self.records {
            if self.matches(record, next_closer) {
                return (false, false);
            }
            if self.covers(record, next_closer) {
                covered = true;
                opted_out = opted_out || record.rdata.opt_out();
            }
        }

        (opted_out, covered)
    }
}

#[derive(Debug, Default)]
pub(crate) struct ClosestEncloserProof {
    pub closest_encloser: bool,
    pub next_closer: bool,
    pub wildcard: bool,
    pub opted_out: bool,
}

/// RFC 5155 §5: IH(salt, x, 0) = H(x || salt), then iterate.
pub(crate) fn hash_name(name: &Name, salt: &[u8], iterations: u16) -> Vec<u8> {
    let mut data = name_wire(&canonical_name(name));

    for _ in 0..=iterations {
        data.extend_from_slice(salt);
        data = ring::digest::digest(&ring::digest::SHA1_FOR_LEGACY_USE_ONLY, &data)
            .as_ref()
            .to_vec();
    }

    data
}

/// Decodes the Base32hex first label of an NSEC3 owner name.
fn owner_hash(owner: &Name) -> Option<Vec<u8>> {
    let label = owner.iter().next()?;
    let label: Vec<u8> = label.iter().map(u8::to_ascii_lowercase).collect();
    BASE32_DNSSEC.decode(&label).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    // The RFC 5155 appendix A zone: salt aabbccdd, 12 iterations.
    const SALT: [u8; 4] = [0xAA, 0xBB, 0xCC, 0xDD];

    fn hash_b32(name: &str) -> String {
        let name = Name::from_str(name).unwrap();
        BASE32_DNSSEC.encode(&hash_name(&name, &SALT, 12))
    }

    #[test]
    fn hashes_match_the_rfc_5155_vectors() {
        assert_eq!(hash_b32("example."), "0p9mhaveqvm6t7vbl5lop2u3t2rp3tom");
        assert_eq!(hash_b32("a.example."), "35mthgpgcu1qg68fab165klnsnk3dpvl");
        assert_eq!(hash_b32("ai.example."), "gjeqe526plbf1g8mklp59enfd789njgi");
    }

    #[test]
    fn hashing_is_case_insensitive() {
        assert_eq!(hash_b32("A.EXAMPLE."), hash_b32("a.example."));
    }
}
