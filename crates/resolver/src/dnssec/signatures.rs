//! Turns the RRSIGs of a message section into [`SignatureRecord`]s,
//! verifies them against a key set, and enforces the one-RRSIG-per-rrset
//! accounting of RFC 4035 §2.2.

use super::crypto;
use super::types::SignatureRecord;
use hickory_proto::dnssec::rdata::{DNSSECRData, DNSKEY};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use rootward_domain::record::{canonical_name, extract_records_of_name_and_type};
use rootward_domain::ResolverError;
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Section {
    Answer,
    Authority,
}

pub(crate) fn dnskeys_from_records(records: &[Record]) -> Vec<(Name, DNSKEY)> {
    records
        .iter()
        .filter_map(|record| match record.data() {
            RData::DNSSEC(DNSSECRData::DNSKEY(dnskey)) => {
                Some((canonical_name(record.name()), dnskey.clone()))
            }
            _ => None,
        })
        .collect()
}

fn now_unix() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Builds one signature record per RRSIG in `records`, attempting to
/// verify each against the offered keys. Also checks the section's
/// accounting: every rrset must have exactly one signature record, with NS
/// exempt in the authority section (the parent doesn't sign the child's
/// delegation) and RRSIGs never counting themselves.
pub(crate) fn authenticate(
    zone: &Name,
    records: &[Record],
    keys: &[(Name, DNSKEY)],
    section: Section,
) -> (Vec<SignatureRecord>, Option<ResolverError>) {
    let zone = canonical_name(zone);
    let now = now_unix();

    let mut signatures = Vec::new();

    for record in records {
        let RData::DNSSEC(DNSSECRData::RRSIG(rrsig)) = record.data() else {
            continue;
        };
        let input = rrsig;

        let owner = canonical_name(record.name());
        let mut sig = SignatureRecord {
            zone: zone.clone(),
            name: owner.clone(),
            rtype: input.type_covered(),
            algorithm: u8::from(input.algorithm()),
            key_tag: input.key_tag(),
            labels: input.num_labels(),
            original_ttl: input.original_ttl(),
            expiration: input.sig_expiration().get(),
            inception: input.sig_inception().get(),
            signer_name: canonical_name(input.signer_name()),
            sig: rrsig.sig().to_vec(),
            rrset: extract_records_of_name_and_type(records, &owner, input.type_covered()),
            key: None,
            wildcard: false,
            verified: false,
            err: None,
        };

        if sig.zone != sig.signer_name {
            sig.err = Some(ResolverError::SignerNameMismatch {
                zone: sig.zone.clone(),
                signer: sig.signer_name.clone(),
            });
            signatures.push(sig);
            continue;
        }

        if owner.num_labels() < sig.labels {
            sig.err = Some(ResolverError::InvalidLabelCount {
                owner_labels: owner.num_labels(),
                rrsig_labels: sig.labels,
            });
            signatures.push(sig);
            continue;
        }

        if now < sig.inception || now > sig.expiration {
            sig.err = Some(ResolverError::InvalidTime);
            signatures.push(sig);
            continue;
        }

        if owner.num_labels() > sig.labels {
            sig.wildcard = true;
        }

        // More than one key can share owner, algorithm and tag
        // (RFC 4035 §5.3.1); each matching key gets a try.
        for (key_owner, key) in keys {
            let matches = crypto::dnskey_algorithm(key) == sig.algorithm
                && crypto::key_tag(key) == sig.key_tag
                && *key_owner == sig.signer_name;
            if !matches {
                continue;
            }

            match crypto::verify_signature(&sig, key) {
                Ok(()) => {
                    sig.key = Some(key.clone());
                    sig.verified = true;
                    sig.err = None;
                    break;
                }
                Err(e) => sig.err = Some(e),
            }
        }

        signatures.push(sig);
    }

    // There must be an RRSIG for each rrset (RFC 4035 §2.2): count the
    // distinct owner/type pairs we saw against the signatures present.
    let mut combinations: HashSet<(Name, RecordType)> = HashSet::new();
    for record in records {
        let rtype = record.record_type();
        if rtype == RecordType::RRSIG {
            continue;
        }
        if section == Section::Authority && rtype == RecordType::NS {
            continue;
        }
        combinations.insert((canonical_name(record.name()), rtype));
    }

    let err = if combinations.len() != signatures.len() {
        Some(ResolverError::UnexpectedSignatureCount {
            found: signatures.len(),
            expected: combinations.len(),
        })
    } else {
        None
    };

    (signatures, err)
}

/// Applies the signature policy: each covered rrset needs one verified
/// signature, or all of them with `require_all`. An empty set cannot prove
/// anything.
pub(crate) fn verify_signature_sets(
    signatures: &[&SignatureRecord],
    require_all: bool,
) -> Result<(), ResolverError> {
    if signatures.is_empty() {
        return Err(ResolverError::SignatureSetEmpty);
    }

    let mut groups: Vec<(&Name, RecordType)> = Vec::new();
    for sig in signatures {
        if !groups.contains(&(&sig.name, sig.rtype)) {
            groups.push((&sig.name, sig.rtype));
        }
    }

    for (name, rtype) in groups {
        let members: Vec<&SignatureRecord> = signatures
            .iter()
            .copied()
            .filter(|s| s.name == *name && s.rtype == rtype)
            .collect();

        let ok = if require_all {
            members.iter().all(|s| s.verified)
        } else {
            members.iter().any(|s| s.verified)
        };

        if !ok {
            let cause = members
                .iter()
                .find_map(|s| s.err.clone())
                .unwrap_or_else(|| {
                    ResolverError::InvalidSignature(
                        "no key verified the rrset signature".into(),
                    )
                });
            return Err(cause);
        }
    }

    Ok(())
}
