//! Fixtures for the DNSSEC tests: freshly generated Ed25519 zone keys,
//! record signing through the same signed-data construction the verifier
//! checks against, and canned signer zones.

use super::crypto;
use super::types::{SignatureRecord, SignerZone};
use crate::context::QueryContext;
use async_trait::async_trait;
use hickory_proto::dnssec::rdata::sig::{SerialNumber, SigInput};
use hickory_proto::dnssec::rdata::{DNSSECRData, DNSKEY, DS, RRSIG};
use hickory_proto::dnssec::{Algorithm, PublicKeyBuf};
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};
use rootward_domain::record::canonical_name;
use rootward_domain::ResolverError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_unix() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// A zone's signing key: generated fresh per test, usable as both KSK and
/// ZSK (a combined signing key, flags 257).
pub(crate) struct TestKey {
    zone: Name,
    keypair: Ed25519KeyPair,
    dnskey: DNSKEY,
}

impl TestKey {
    pub(crate) fn new(zone: &Name) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).expect("generate test key");
        let keypair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).expect("load test key");

        let public_key =
            PublicKeyBuf::new(keypair.public_key().as_ref().to_vec(), Algorithm::ED25519);
        let dnskey = DNSKEY::new(true, true, false, public_key);

        Self {
            zone: canonical_name(zone),
            keypair,
            dnskey,
        }
    }

    pub(crate) fn key_tag(&self) -> u16 {
        crypto::key_tag(&self.dnskey)
    }

    pub(crate) fn dnskey_record(&self) -> Record {
        Record::from_rdata(
            self.zone.clone(),
            300,
            RData::DNSSEC(DNSSECRData::DNSKEY(self.dnskey.clone())),
        )
    }

    /// The DS record the parent zone would publish for this key.
    pub(crate) fn ds(&self) -> DS {
        let mut data = crypto::name_wire(&self.zone);
        data.extend_from_slice(&self.dnskey.flags().to_be_bytes());
        data.push(3);
        data.push(u8::from(Algorithm::ED25519));
        data.extend_from_slice(self.keypair.public_key().as_ref());

        DS::new(
            self.key_tag(),
            Algorithm::ED25519,
            hickory_proto::dnssec::DigestType::SHA256,
            Sha256::digest(&data).to_vec(),
        )
    }

    pub(crate) fn ds_record(&self) -> Record {
        Record::from_rdata(
            self.zone.clone(),
            300,
            RData::DNSSEC(DNSSECRData::DS(self.ds())),
        )
    }

    /// Signs an rrset, yielding the RRSIG record to file alongside it.
    pub(crate) fn sign(&self, rrset: &[Record]) -> Record {
        let owner = canonical_name(rrset[0].name());
        self.sign_as(rrset, owner.num_labels())
    }

    /// Signs with an explicit label count, e.g. to mimic a wildcard
    /// expansion where the signature has fewer labels than the owner.
    pub(crate) fn sign_as(&self, rrset: &[Record], labels: u8) -> Record {
        let owner = canonical_name(rrset[0].name());
        let rtype = rrset[0].record_type();
        let ttl = rrset[0].ttl();

        let mut sig = SignatureRecord {
            zone: self.zone.clone(),
            name: owner.clone(),
            rtype,
            algorithm: u8::from(Algorithm::ED25519),
            key_tag: self.key_tag(),
            labels,
            original_ttl: ttl,
            expiration: now_unix() + 86_400,
            inception: now_unix().saturating_sub(86_400),
            signer_name: self.zone.clone(),
            sig: Vec::new(),
            rrset: rrset.to_vec(),
            key: None,
            wildcard: false,
            verified: false,
            err: None,
        };

        let data = crypto::rrsig_signed_data(&sig).expect("signable rrset");
        sig.sig = self.keypair.sign(&data).as_ref().to_vec();

        let input = SigInput {
            type_covered: rtype,
            algorithm: Algorithm::ED25519,
            num_labels: labels,
            original_ttl: ttl,
            sig_expiration: SerialNumber(sig.expiration),
            sig_inception: SerialNumber(sig.inception),
            key_tag: sig.key_tag,
            signer_name: self.zone.clone(),
        };

        Record::from_rdata(
            owner,
            ttl,
            RData::DNSSEC(DNSSECRData::RRSIG(RRSIG::new(input, sig.sig.clone()))),
        )
    }

    /// The zone's DNSKEY answer: the key plus its self-signature.
    pub(crate) fn dnskey_rrset(&self) -> Vec<Record> {
        let key = self.dnskey_record();
        let sig = self.sign(std::slice::from_ref(&key));
        vec![key, sig]
    }
}

/// A [`SignerZone`] with canned DNSKEY and DS answers.
pub(crate) struct StaticSigner {
    name: Name,
    dnskeys: Result<Vec<Record>, ResolverError>,
    dnskey_responses: HashMap<Name, Vec<Record>>,
    ds_responses: HashMap<Name, Message>,
}

impl StaticSigner {
    pub(crate) fn new(name: &Name, dnskeys: Vec<Record>) -> Self {
        Self {
            name: canonical_name(name),
            dnskeys: Ok(dnskeys),
            dnskey_responses: HashMap::new(),
            ds_responses: HashMap::new(),
        }
    }

    /// DNSKEYs served for another apex hosted on the same servers.
    pub(crate) fn with_dnskey_response(mut self, qname: &Name, records: Vec<Record>) -> Self {
        self.dnskey_responses
            .insert(canonical_name(qname), records);
        self
    }

    pub(crate) fn with_ds_response(mut self, qname: &Name, msg: Message) -> Self {
        self.ds_responses.insert(canonical_name(qname), msg);
        self
    }
}

#[async_trait]
impl SignerZone for StaticSigner {
    fn name(&self) -> &Name {
        &self.name
    }

    async fn dnskey_records(&self, _ctx: &QueryContext) -> Result<Vec<Record>, ResolverError> {
        self.dnskeys.clone()
    }

    async fn lookup_dnskey(
        &self,
        ctx: &QueryContext,
        qname: &Name,
    ) -> Result<Vec<Record>, ResolverError> {
        if let Some(records) = self.dnskey_responses.get(&canonical_name(qname)) {
            return Ok(records.clone());
        }
        self.dnskey_records(ctx).await
    }

    async fn lookup_ds(
        &self,
        _ctx: &QueryContext,
        qname: &Name,
    ) -> Result<Option<Message>, ResolverError> {
        Ok(self.ds_responses.get(&canonical_name(qname)).cloned())
    }
}

/// A response message with the given sections, answering `qname`/`qtype`.
pub(crate) fn response(
    qname: &Name,
    qtype: RecordType,
    answers: Vec<Record>,
    authority: Vec<Record>,
) -> Message {
    let mut msg = Message::new();
    msg.set_id(fastrand::u16(..));
    msg.set_message_type(MessageType::Response);
    msg.set_op_code(OpCode::Query);
    msg.add_query(Query::query(canonical_name(qname), qtype));
    for record in answers {
        msg.add_answer(record);
    }
    for record in authority {
        msg.add_name_server(record);
    }
    msg
}
