//! Verification of a single response given the DS records its parent
//! published: prove the zone's keys, check every signature, classify the
//! response, and collect whatever denial-of-existence it carries.

use super::doe::{Nsec3Proofs, NsecProofs};
use super::signatures::{authenticate, dnskeys_from_records, verify_signature_sets, Section};
use super::types::{extract_ds_records, SignerZone, ZoneResult};
use super::{crypto, AuthState, DoeState};
use crate::context::QueryContext;
use hickory_proto::dnssec::rdata::{DNSKEY, DS};
use hickory_proto::op::Message;
use hickory_proto::rr::{Name, RecordType};
use rootward_domain::record::{
    canonical_name, extract_records_of_type, records_have_same_owner, records_of_type_exist,
};
use rootward_domain::{ResolverConfig, ResolverError};
use std::sync::Arc;
use tracing::debug;

pub(crate) async fn verify_response(
    ctx: &QueryContext,
    zone: &Arc<dyn SignerZone>,
    msg: &Message,
    parent_ds: &[DS],
    config: &ResolverConfig,
) -> ZoneResult {
    let mut result = ZoneResult::new(canonical_name(zone.name()), Some(msg.clone()));

    // The chain went insecure at some earlier delegation; there's nothing
    // left to prove against.
    if parent_ds.is_empty() {
        result.state = AuthState::Insecure;
        return result;
    }

    let keys = match zone.dnskey_records(ctx).await {
        Ok(keys) => keys,
        Err(e) => {
            result.state = AuthState::Bogus;
            result.err = Some(e);
            return result;
        }
    };

    if let Err(e) = verify_dnskeys(&mut result, &keys, parent_ds, config) {
        result.err = Some(e);
        return result;
    }

    let zone_keys = dnskeys_from_records(&keys);
    if let Err(e) = verify_rrsets(&mut result, msg, &zone_keys, config) {
        result.err = Some(e);
        return result;
    }

    // Headers are unsigned, so classification looks only at the sections.
    let soa_in_authority = records_of_type_exist(msg.name_servers(), RecordType::SOA);
    let ns_in_authority = records_of_type_exist(msg.name_servers(), RecordType::NS);

    if !soa_in_authority && msg.answers().is_empty() && ns_in_authority {
        validate_delegating_response(&mut result, msg);
    } else if !soa_in_authority && !msg.answers().is_empty() {
        validate_positive_response(&mut result);
    } else if soa_in_authority {
        validate_negative_response(&mut result);
    } else {
        result.state = AuthState::Bogus;
        result.err = Some(ResolverError::FailsafeResponse);
    }

    debug!(
        trace = %ctx.trace.short_id(),
        zone = %result.zone_name,
        state = %result.state,
        doe = %result.doe,
        "response verified"
    );

    result
}

/// Step one of the chain link: the zone's own DNSKEY rrset must be signed
/// by a key the parent's DS records vouch for.
fn verify_dnskeys(
    result: &mut ZoneResult,
    keys: &[hickory_proto::rr::Record],
    parent_ds: &[DS],
    config: &ResolverConfig,
) -> Result<(), ResolverError> {
    let zone_keys = dnskeys_from_records(keys);
    if zone_keys.is_empty() {
        result.state = AuthState::Insecure;
        return Err(ResolverError::KeysNotFound);
    }

    let key_signing_keys: Vec<(Name, DNSKEY)> = parent_ds
        .iter()
        .filter_map(|ds| {
            zone_keys
                .iter()
                .find(|(owner, key)| crypto::dnskey_matches_ds(owner, key, ds))
                .cloned()
        })
        .collect();

    if key_signing_keys.is_empty() {
        result.state = AuthState::Insecure;
        return Err(ResolverError::KeysNotFound);
    }

    let (key_signatures, count_err) =
        authenticate(&result.zone_name, keys, &key_signing_keys, Section::Answer);
    result.keys = key_signatures;

    if let Some(e) = count_err {
        result.state = AuthState::Bogus;
        return Err(ResolverError::BogusResultFound(e.to_string()));
    }

    let refs: Vec<_> = result.keys.iter().collect();
    if let Err(e) = verify_signature_sets(&refs, config.require_all_signatures_valid) {
        result.state = AuthState::Bogus;
        return Err(ResolverError::BogusResultFound(e.to_string()));
    }

    Ok(())
}

/// Step two: every rrset in the answer and authority sections must carry a
/// signature that verifies under the zone's keys.
fn verify_rrsets(
    result: &mut ZoneResult,
    msg: &Message,
    zone_keys: &[(Name, DNSKEY)],
    config: &ResolverConfig,
) -> Result<(), ResolverError> {
    let (answer, answer_err) =
        authenticate(&result.zone_name, msg.answers(), zone_keys, Section::Answer);
    if let Some(e) = answer_err {
        result.state = AuthState::Bogus;
        return Err(ResolverError::BogusResultFound(e.to_string()));
    }

    let (authority, authority_err) = authenticate(
        &result.zone_name,
        msg.name_servers(),
        zone_keys,
        Section::Authority,
    );
    if let Some(e) = authority_err {
        result.state = AuthState::Bogus;
        return Err(ResolverError::BogusResultFound(e.to_string()));
    }

    let refs: Vec<_> = answer.iter().chain(authority.iter()).collect();
    if let Err(e) = verify_signature_sets(&refs, config.require_all_signatures_valid) {
        result.state = AuthState::Bogus;
        return Err(ResolverError::BogusResultFound(e.to_string()));
    }

    result.answer = answer;
    result.authority = authority;
    Ok(())
}

/// A referral down the tree. Signed DS records seal the link; without
/// them there must be proof that no DS exists (or that the span opted
/// out of signing).
fn validate_delegating_response(result: &mut ZoneResult, msg: &Message) {
    result.ds_records = extract_ds_records(&result.authority);
    if !result.ds_records.is_empty() {
        result.state = AuthState::Secure;
        return;
    }

    let ns_records = extract_records_of_type(msg.name_servers(), RecordType::NS);
    if !records_have_same_owner(&ns_records) {
        // Without a single owner we can't even name the delegation to
        // check its denial records.
        result.state = AuthState::Bogus;
        result.err = Some(ResolverError::NsRecordsHaveMismatchingOwners);
        return;
    }
    let delegation_name = canonical_name(ns_records[0].name());

    let nsec = NsecProofs::from_signatures(&result.zone_name, &result.authority);
    let nsec3 = Nsec3Proofs::from_signatures(&result.zone_name, &result.authority);

    // RFC 5155 §8.9: the matching record must carry NS, and none of DS,
    // CNAME or SOA (SOA would mean it came from the child side of the cut).
    let unsigned_delegation_bits = |proofs_ns: (bool, bool), proofs_bad: (bool, bool)| {
        let (name_seen, ns_seen) = proofs_ns;
        let (_, bad_seen) = proofs_bad;
        name_seen && ns_seen && !bad_seen
    };

    if !nsec.is_empty()
        && unsigned_delegation_bits(
            nsec.type_bit_map_contains_any_of(&delegation_name, &[RecordType::NS]),
            nsec.type_bit_map_contains_any_of(
                &delegation_name,
                &[RecordType::CNAME, RecordType::DS, RecordType::SOA],
            ),
        )
    {
        result.doe = DoeState::NsecMissingDs;
        result.state = AuthState::Secure;
        return;
    }

    if !nsec3.is_empty() {
        if unsigned_delegation_bits(
            nsec3.type_bit_map_contains_any_of(&delegation_name, &[RecordType::NS]),
            nsec3.type_bit_map_contains_any_of(
                &delegation_name,
                &[RecordType::CNAME, RecordType::DS, RecordType::SOA],
            ),
        ) {
            result.doe = DoeState::Nsec3MissingDs;
            result.state = AuthState::Secure;
            return;
        }

        if nsec3.closest_encloser_proof(&delegation_name).opted_out {
            // The span opted out; everything below is insecure but the
            // referral itself checks out.
            result.doe = DoeState::Nsec3OptOut;
            result.state = AuthState::Secure;
            return;
        }
    }

    result.state = AuthState::Bogus;
    result.err = Some(ResolverError::BogusDoeRecordsNotFound);
}

/// A response with answers. A wildcard-expanded answer additionally needs
/// proof that the literal qname does not exist (RFC 5155 §8.8).
fn validate_positive_response(result: &mut ZoneResult) {
    result.ds_records = extract_ds_records(&result.answer);

    let nsec = NsecProofs::from_signatures(&result.zone_name, &result.authority);
    let nsec3 = Nsec3Proofs::from_signatures(&result.zone_name, &result.authority);

    let qname = result.question.as_ref().map(|q| q.name().clone());

    let mut wildcard_seen = false;
    let mut wildcard_verified = false;

    for sig in &result.answer {
        if !sig.wildcard {
            continue;
        }

        if wildcard_seen {
            result.state = AuthState::Bogus;
            result.err = Some(ResolverError::MultipleWildcardSignatures);
            return;
        }
        wildcard_seen = true;

        if let Some(qname) = qname.as_ref() {
            if !nsec.is_empty() && nsec.expanded_wildcard_proof(qname) {
                result.doe = DoeState::NsecWildcard;
                wildcard_verified = true;
            }
        }
        if !nsec3.is_empty() && nsec3.expanded_wildcard_proof(&sig.name, sig.labels) {
            result.doe = DoeState::Nsec3Wildcard;
            wildcard_verified = true;
        }
    }

    if !wildcard_seen || wildcard_verified {
        result.state = AuthState::Secure;
        return;
    }

    result.state = AuthState::Bogus;
    result.err = Some(ResolverError::BogusWildcardDoeNotFound);
}

/// A response whose authority carries a SOA: NODATA or NXDOMAIN. Something
/// has to prove the absence.
fn validate_negative_response(result: &mut ZoneResult) {
    let Some(question) = result.question.clone() else {
        result.state = AuthState::Bogus;
        result.err = Some(ResolverError::FailsafeResponse);
        return;
    };
    let qname = canonical_name(question.name());
    let qtype = question.query_type();

    let nsec = NsecProofs::from_signatures(&result.zone_name, &result.authority);
    let nsec3 = Nsec3Proofs::from_signatures(&result.zone_name, &result.authority);

    if nsec.is_empty() && nsec3.is_empty() {
        result.state = AuthState::Bogus;
        result.err = Some(ResolverError::BogusDoeRecordsNotFound);
        return;
    }

    if !nsec.is_empty() {
        let (name_seen, type_seen) =
            nsec.type_bit_map_contains_any_of(&qname, &[RecordType::CNAME, qtype]);
        if name_seen && !type_seen {
            result.doe = DoeState::NsecNoData;
            result.state = AuthState::Secure;
            return;
        }

        if nsec.qname_does_not_exist(&qname) {
            result.doe = DoeState::NsecNxDomain;
            result.state = AuthState::Secure;
            return;
        }
    }

    if !nsec3.is_empty() {
        let (name_seen, type_seen) =
            nsec3.type_bit_map_contains_any_of(&qname, &[RecordType::CNAME, qtype]);
        if name_seen && !type_seen {
            result.doe = DoeState::Nsec3NoData;
            result.state = AuthState::Secure;
            return;
        }

        // Wildcard NODATA (RFC 5155 §8.7): the wildcard at the closest
        // encloser exists but lacks the qtype.
        if let Some((closest_encloser, _)) = nsec3.closest_encloser(&qname) {
            let wildcard = Name::from_ascii("*")
                .and_then(|star| star.append_domain(&closest_encloser));
            if let Ok(wildcard) = wildcard {
                let (name_seen, type_seen) = nsec3
                    .type_bit_map_contains_any_of(&wildcard, &[RecordType::CNAME, qtype]);
                if name_seen && !type_seen {
                    result.doe = DoeState::Nsec3NoData;
                    result.state = AuthState::Secure;
                    return;
                }
            }
        }

        let proof = nsec3.closest_encloser_proof(&qname);
        if proof.opted_out {
            result.doe = DoeState::Nsec3OptOut;
            result.state = AuthState::Secure;
            return;
        }
        if proof.closest_encloser && proof.next_closer && proof.wildcard {
            result.doe = DoeState::Nsec3NxDomain;
            result.state = AuthState::Secure;
            return;
        }
    }

    result.state = AuthState::Bogus;
    result.err = Some(ResolverError::BogusDoeRecordsNotFound);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dnssec::test_support::{response, StaticSigner, TestKey};
    use hickory_proto::dnssec::rdata::NSEC;
    use hickory_proto::rr::rdata::{A, NS, SOA};
    use hickory_proto::rr::{RData, Record};
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    const ZONE: &str = "example.com.";

    fn name(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    fn a_record(owner: &str) -> Record {
        Record::from_rdata(name(owner), 300, RData::A(A(Ipv4Addr::new(192, 0, 2, 1))))
    }

    fn ns_record(owner: &str, host: &str) -> Record {
        Record::from_rdata(name(owner), 300, RData::NS(NS(name(host))))
    }

    fn soa_record(owner: &str) -> Record {
        Record::from_rdata(
            name(owner),
            300,
            RData::SOA(SOA::new(
                name("ns1.example.com."),
                name("hostmaster.example.com."),
                1,
                7200,
                3600,
                1_209_600,
                300,
            )),
        )
    }

    fn nsec_record(owner: &str, next: &str, types: Vec<RecordType>) -> Record {
        Record::from_rdata(
            name(owner),
            300,
            RData::DNSSEC(hickory_proto::dnssec::rdata::DNSSECRData::NSEC(NSEC::new(
                name(next),
                types,
            ))),
        )
    }

    fn signer(key: &TestKey) -> Arc<dyn SignerZone> {
        Arc::new(StaticSigner::new(&name(ZONE), key.dnskey_rrset()))
    }

    #[tokio::test]
    async fn empty_parent_ds_short_circuits_to_insecure() {
        let ctx = QueryContext::new();
        let key = TestKey::new(&name(ZONE));
        let msg = response(&name("www.example.com."), RecordType::A, vec![], vec![]);

        let result =
            verify_response(&ctx, &signer(&key), &msg, &[], &ResolverConfig::default()).await;

        assert_eq!(result.state, AuthState::Insecure);
        assert!(result.err.is_none());
    }

    #[tokio::test]
    async fn signed_positive_answer_is_secure() {
        let ctx = QueryContext::new();
        let key = TestKey::new(&name(ZONE));

        let answer = a_record("www.example.com.");
        let sig = key.sign(std::slice::from_ref(&answer));
        let msg = response(
            &name("www.example.com."),
            RecordType::A,
            vec![answer, sig],
            vec![],
        );

        let result = verify_response(
            &ctx,
            &signer(&key),
            &msg,
            &[key.ds()],
            &ResolverConfig::default(),
        )
        .await;

        assert_eq!(result.state, AuthState::Secure);
        assert_eq!(result.doe, DoeState::NotFound);
        assert!(result.ds_records.is_empty());
    }

    #[tokio::test]
    async fn keys_not_matching_the_parent_ds_are_insecure() {
        let ctx = QueryContext::new();
        let key = TestKey::new(&name(ZONE));
        let unrelated = TestKey::new(&name(ZONE));

        let answer = a_record("www.example.com.");
        let sig = key.sign(std::slice::from_ref(&answer));
        let msg = response(
            &name("www.example.com."),
            RecordType::A,
            vec![answer, sig],
            vec![],
        );

        let result = verify_response(
            &ctx,
            &signer(&key),
            &msg,
            &[unrelated.ds()],
            &ResolverConfig::default(),
        )
        .await;

        assert_eq!(result.state, AuthState::Insecure);
        assert!(matches!(result.err, Some(ResolverError::KeysNotFound)));
    }

    #[tokio::test]
    async fn unsigned_answers_are_bogus() {
        let ctx = QueryContext::new();
        let key = TestKey::new(&name(ZONE));

        let msg = response(
            &name("www.example.com."),
            RecordType::A,
            vec![a_record("www.example.com.")],
            vec![],
        );

        let result = verify_response(
            &ctx,
            &signer(&key),
            &msg,
            &[key.ds()],
            &ResolverConfig::default(),
        )
        .await;

        assert_eq!(result.state, AuthState::Bogus);
    }

    #[tokio::test]
    async fn answers_signed_by_a_rogue_key_are_bogus() {
        let ctx = QueryContext::new();
        let key = TestKey::new(&name(ZONE));
        let rogue = TestKey::new(&name(ZONE));

        let answer = a_record("www.example.com.");
        let sig = rogue.sign(std::slice::from_ref(&answer));
        let msg = response(
            &name("www.example.com."),
            RecordType::A,
            vec![answer, sig],
            vec![],
        );

        let result = verify_response(
            &ctx,
            &signer(&key),
            &msg,
            &[key.ds()],
            &ResolverConfig::default(),
        )
        .await;

        assert_eq!(result.state, AuthState::Bogus);
    }

    #[tokio::test]
    async fn delegation_with_signed_ds_records_is_secure() {
        let ctx = QueryContext::new();
        let key = TestKey::new(&name(ZONE));
        let child_key = TestKey::new(&name("child.example.com."));

        let ds = child_key.ds_record();
        let ds_sig = key.sign(std::slice::from_ref(&ds));
        let msg = response(
            &name("www.child.example.com."),
            RecordType::A,
            vec![],
            vec![
                ns_record("child.example.com.", "ns1.child.example.com."),
                ds,
                ds_sig,
            ],
        );

        let result = verify_response(
            &ctx,
            &signer(&key),
            &msg,
            &[key.ds()],
            &ResolverConfig::default(),
        )
        .await;

        assert_eq!(result.state, AuthState::Secure);
        assert_eq!(result.ds_records.len(), 1);
        assert_eq!(result.ds_records[0].key_tag(), child_key.key_tag());
    }

    #[tokio::test]
    async fn unsigned_delegation_needs_a_missing_ds_proof() {
        let ctx = QueryContext::new();
        let key = TestKey::new(&name(ZONE));

        let nsec = nsec_record(
            "child.example.com.",
            "m.example.com.",
            vec![RecordType::NS, RecordType::A],
        );
        let nsec_sig = key.sign(std::slice::from_ref(&nsec));
        let msg = response(
            &name("www.child.example.com."),
            RecordType::A,
            vec![],
            vec![
                ns_record("child.example.com.", "ns1.child.example.com."),
                nsec,
                nsec_sig,
            ],
        );

        let result = verify_response(
            &ctx,
            &signer(&key),
            &msg,
            &[key.ds()],
            &ResolverConfig::default(),
        )
        .await;

        assert_eq!(result.state, AuthState::Secure);
        assert_eq!(result.doe, DoeState::NsecMissingDs);
    }

    #[tokio::test]
    async fn unsigned_delegation_without_denial_records_is_bogus() {
        let ctx = QueryContext::new();
        let key = TestKey::new(&name(ZONE));

        let msg = response(
            &name("www.child.example.com."),
            RecordType::A,
            vec![],
            vec![ns_record("child.example.com.", "ns1.child.example.com.")],
        );

        let result = verify_response(
            &ctx,
            &signer(&key),
            &msg,
            &[key.ds()],
            &ResolverConfig::default(),
        )
        .await;

        assert_eq!(result.state, AuthState::Bogus);
        assert!(matches!(
            result.err,
            Some(ResolverError::BogusDoeRecordsNotFound)
        ));
    }

    #[tokio::test]
    async fn nodata_with_an_nsec_proof_is_secure() {
        let ctx = QueryContext::new();
        let key = TestKey::new(&name(ZONE));

        let soa = soa_record(ZONE);
        let soa_sig = key.sign(std::slice::from_ref(&soa));
        let nsec = nsec_record("www.example.com.", "z.example.com.", vec![RecordType::A]);
        let nsec_sig = key.sign(std::slice::from_ref(&nsec));

        let msg = response(
            &name("www.example.com."),
            RecordType::MX,
            vec![],
            vec![soa, soa_sig, nsec, nsec_sig],
        );

        let result = verify_response(
            &ctx,
            &signer(&key),
            &msg,
            &[key.ds()],
            &ResolverConfig::default(),
        )
        .await;

        assert_eq!(result.state, AuthState::Secure);
        assert_eq!(result.doe, DoeState::NsecNoData);
    }

    #[tokio::test]
    async fn nxdomain_with_covering_nsec_spans_is_secure() {
        let ctx = QueryContext::new();
        let key = TestKey::new(&name(ZONE));

        let soa = soa_record(ZONE);
        let soa_sig = key.sign(std::slice::from_ref(&soa));
        // One span covers the qname, a second (apex-owned) covers the
        // wildcard.
        let covering = nsec_record("m.example.com.", "p.example.com.", vec![RecordType::A]);
        let covering_sig = key.sign(std::slice::from_ref(&covering));
        let apex = nsec_record("example.com.", "b.example.com.", vec![RecordType::SOA]);
        let apex_sig = key.sign(std::slice::from_ref(&apex));

        let msg = response(
            &name("nope.example.com."),
            RecordType::A,
            vec![],
            vec![soa, soa_sig, covering, covering_sig, apex, apex_sig],
        );

        let result = verify_response(
            &ctx,
            &signer(&key),
            &msg,
            &[key.ds()],
            &ResolverConfig::default(),
        )
        .await;

        assert_eq!(result.state, AuthState::Secure);
        assert_eq!(result.doe, DoeState::NsecNxDomain);
    }

    #[tokio::test]
    async fn negative_response_without_denial_records_is_bogus() {
        let ctx = QueryContext::new();
        let key = TestKey::new(&name(ZONE));

        let soa = soa_record(ZONE);
        let soa_sig = key.sign(std::slice::from_ref(&soa));
        let msg = response(
            &name("nope.example.com."),
            RecordType::A,
            vec![],
            vec![soa, soa_sig],
        );

        let result = verify_response(
            &ctx,
            &signer(&key),
            &msg,
            &[key.ds()],
            &ResolverConfig::default(),
        )
        .await;

        assert_eq!(result.state, AuthState::Bogus);
        assert!(matches!(
            result.err,
            Some(ResolverError::BogusDoeRecordsNotFound)
        ));
    }

    #[tokio::test]
    async fn wildcard_expansion_without_proof_is_bogus() {
        let ctx = QueryContext::new();
        let key = TestKey::new(&name(ZONE));

        let answer = a_record("www.example.com.");
        // Signed as a wildcard: one fewer label than the owner.
        let sig = key.sign_as(std::slice::from_ref(&answer), 2);
        let msg = response(
            &name("www.example.com."),
            RecordType::A,
            vec![answer, sig],
            vec![],
        );

        let result = verify_response(
            &ctx,
            &signer(&key),
            &msg,
            &[key.ds()],
            &ResolverConfig::default(),
        )
        .await;

        assert_eq!(result.state, AuthState::Bogus);
        assert!(matches!(
            result.err,
            Some(ResolverError::BogusWildcardDoeNotFound)
        ));
    }

    #[tokio::test]
    async fn wildcard_expansion_with_an_nsec_proof_is_secure() {
        let ctx = QueryContext::new();
        let key = TestKey::new(&name(ZONE));

        let answer = a_record("www.example.com.");
        let sig = key.sign_as(std::slice::from_ref(&answer), 2);

        // Covers www.example.com. (proving it doesn't literally exist)
        // without covering *.example.com.
        let nsec = nsec_record("t.example.com.", "z.example.com.", vec![RecordType::A]);
        let nsec_sig = key.sign(std::slice::from_ref(&nsec));

        let msg = response(
            &name("www.example.com."),
            RecordType::A,
            vec![answer, sig],
            vec![nsec, nsec_sig],
        );

        let result = verify_response(
            &ctx,
            &signer(&key),
            &msg,
            &[key.ds()],
            &ResolverConfig::default(),
        )
        .await;

        assert_eq!(result.state, AuthState::Secure);
        assert_eq!(result.doe, DoeState::NsecWildcard);
    }

    mod nsec3 {
        use super::*;
        use crate::dnssec::doe::nsec3::hash_name;
        use data_encoding::BASE32_DNSSEC;
        use hickory_proto::dnssec::rdata::NSEC3;
        use hickory_proto::dnssec::Nsec3HashAlgorithm;

        const SALT: [u8; 4] = [0xAA, 0xBB, 0xCC, 0xDD];
        const ITERATIONS: u16 = 2;

        fn hashed(owner: &str) -> Vec<u8> {
            hash_name(&name(owner), &SALT, ITERATIONS)
        }

        /// The hash one step above or below `hash` on the ring.
        fn offset(hash: &[u8], delta: i8) -> Vec<u8> {
            let mut out = hash.to_vec();
            for byte in out.iter_mut().rev() {
                if delta > 0 {
                    let (next, overflow) = byte.overflowing_add(1);
                    *byte = next;
                    if !overflow {
                        break;
                    }
                } else {
                    let (next, overflow) = byte.overflowing_sub(1);
                    *byte = next;
                    if !overflow {
                        break;
                    }
                }
            }
            out
        }

        fn nsec3_record(
            owner_hash: &[u8],
            next_hash: &[u8],
            opt_out: bool,
            types: Vec<RecordType>,
        ) -> Record {
            let owner = Name::from_ascii(format!(
                "{}.{}",
                BASE32_DNSSEC.encode(owner_hash),
                ZONE
            ))
            .unwrap();
            Record::from_rdata(
                owner,
                300,
                RData::DNSSEC(hickory_proto::dnssec::rdata::DNSSECRData::NSEC3(
                    NSEC3::new(
                        Nsec3HashAlgorithm::SHA1,
                        opt_out,
                        ITERATIONS,
                        SALT.to_vec(),
                        next_hash.to_vec(),
                        types,
                    ),
                )),
            )
        }

        /// Matches `owner` exactly, suitable as a closest encloser.
        fn matching(owner: &str, types: Vec<RecordType>) -> Record {
            let hash = hashed(owner);
            nsec3_record(&hash, &offset(&hash, 1), false, types)
        }

        /// Covers `covered` without matching it.
        fn covering(covered: &str, opt_out: bool) -> Record {
            let hash = hashed(covered);
            nsec3_record(
                &offset(&hash, -1),
                &offset(&hash, 1),
                opt_out,
                vec![RecordType::A],
            )
        }

        #[tokio::test]
        async fn nxdomain_with_a_closest_encloser_proof_is_secure() {
            let ctx = QueryContext::new();
            let key = TestKey::new(&name(ZONE));

            let soa = soa_record(ZONE);
            let soa_sig = key.sign(std::slice::from_ref(&soa));

            // The full RFC 5155 §8.4 set: a matched closest encloser, a
            // covered next closer name, and a covered wildcard.
            let encloser = matching(ZONE, vec![RecordType::NS, RecordType::SOA]);
            let encloser_sig = key.sign(std::slice::from_ref(&encloser));
            let next_closer = covering("nope.example.com.", false);
            let next_closer_sig = key.sign(std::slice::from_ref(&next_closer));
            let wildcard = covering("*.example.com.", false);
            let wildcard_sig = key.sign(std::slice::from_ref(&wildcard));

            let msg = response(
                &name("nope.example.com."),
                RecordType::A,
                vec![],
                vec![
                    soa,
                    soa_sig,
                    encloser,
                    encloser_sig,
                    next_closer,
                    next_closer_sig,
                    wildcard,
                    wildcard_sig,
                ],
            );

            let result = verify_response(
                &ctx,
                &signer(&key),
                &msg,
                &[key.ds()],
                &ResolverConfig::default(),
            )
            .await;

            assert_eq!(result.state, AuthState::Secure);
            assert_eq!(result.doe, DoeState::Nsec3NxDomain);
        }

        #[tokio::test]
        async fn an_opted_out_delegation_is_secure_but_flagged() {
            let ctx = QueryContext::new();
            let key = TestKey::new(&name(ZONE));

            let encloser = matching(ZONE, vec![RecordType::NS, RecordType::SOA]);
            let encloser_sig = key.sign(std::slice::from_ref(&encloser));
            let span = covering("child.example.com.", true);
            let span_sig = key.sign(std::slice::from_ref(&span));

            let msg = response(
                &name("www.child.example.com."),
                RecordType::A,
                vec![],
                vec![
                    ns_record("child.example.com.", "ns1.child.example.com."),
                    encloser,
                    encloser_sig,
                    span,
                    span_sig,
                ],
            );

            let result = verify_response(
                &ctx,
                &signer(&key),
                &msg,
                &[key.ds()],
                &ResolverConfig::default(),
            )
            .await;

            assert_eq!(result.state, AuthState::Secure);
            assert_eq!(result.doe, DoeState::Nsec3OptOut);
        }
    }
}
