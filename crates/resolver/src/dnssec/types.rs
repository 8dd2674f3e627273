use super::{AuthState, DoeState};
use crate::context::QueryContext;
use crate::response::Exchange;
use crate::zone::Zone;
use async_trait::async_trait;
use hickory_proto::dnssec::rdata::{DNSKEY, DS};
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, Record, RecordType};
use rootward_domain::record::{canonical_name, set_dnssec_ok};
use rootward_domain::ResolverError;
use std::sync::Arc;

/// The authenticator's view of a zone. Queries made through here go to
/// that zone's own nameservers, never recursively — if they can't answer
/// authoritatively for themselves, that's already an error.
#[async_trait]
pub trait SignerZone: Send + Sync {
    fn name(&self) -> &Name;

    /// The zone's own DNSKEY rrset, signatures included.
    async fn dnskey_records(&self, ctx: &QueryContext) -> Result<Vec<Record>, ResolverError>;

    /// A DO=1 DNSKEY lookup for an arbitrary apex against this zone's
    /// nameservers. Needed when they host more than one zone.
    async fn lookup_dnskey(
        &self,
        ctx: &QueryContext,
        qname: &Name,
    ) -> Result<Vec<Record>, ResolverError>;

    /// A DO=1 DS lookup for `qname` against this zone's nameservers.
    async fn lookup_ds(
        &self,
        ctx: &QueryContext,
        qname: &Name,
    ) -> Result<Option<Message>, ResolverError>;
}

/// Adapts a resolver zone to the authenticator's seam.
pub(crate) struct ZoneSigner {
    zone: Arc<Zone>,
}

impl ZoneSigner {
    pub(crate) fn new(zone: Arc<Zone>) -> Self {
        Self { zone }
    }
}

#[async_trait]
impl SignerZone for ZoneSigner {
    fn name(&self) -> &Name {
        self.zone.name()
    }

    async fn dnskey_records(&self, ctx: &QueryContext) -> Result<Vec<Record>, ResolverError> {
        self.zone.dnskeys(ctx).await
    }

    async fn lookup_dnskey(
        &self,
        ctx: &QueryContext,
        qname: &Name,
    ) -> Result<Vec<Record>, ResolverError> {
        let qname = canonical_name(qname);
        if qname == *self.zone.name() {
            return self.zone.dnskeys(ctx).await;
        }

        let mut msg = Message::new();
        msg.set_id(fastrand::u16(..));
        msg.set_message_type(MessageType::Query);
        msg.set_op_code(OpCode::Query);
        msg.set_recursion_desired(false);
        msg.add_query(Query::query(qname.clone(), RecordType::DNSKEY));
        set_dnssec_ok(&mut msg);

        let response = self.zone.exchange(ctx, &msg).await;
        if let Some(err) = response.err {
            return Err(ResolverError::FailedToGetDnskeys {
                zone: qname,
                reason: err.to_string(),
            });
        }
        match response.msg {
            Some(rmsg) => Ok(rmsg.answers().to_vec()),
            None => Err(ResolverError::FailedToGetDnskeys {
                zone: qname,
                reason: "response is empty".to_string(),
            }),
        }
    }

    async fn lookup_ds(
        &self,
        ctx: &QueryContext,
        qname: &Name,
    ) -> Result<Option<Message>, ResolverError> {
        let mut msg = Message::new();
        msg.set_id(fastrand::u16(..));
        msg.set_message_type(MessageType::Query);
        msg.set_op_code(OpCode::Query);
        msg.set_recursion_desired(false);
        msg.add_query(Query::query(canonical_name(qname), RecordType::DS));
        set_dnssec_ok(&mut msg);

        let response = self.zone.exchange(ctx, &msg).await;
        if let Some(err) = response.err {
            return Err(err);
        }
        Ok(response.msg)
    }
}

/// Re-labels a zone while keeping its lookups. Used when a nameserver
/// hosts several zones at once and a delegation was elided: the response
/// belongs to the skipped child, the servers are still the parent's.
pub(crate) struct WrappedZone {
    name: Name,
    inner: Arc<dyn SignerZone>,
}

impl WrappedZone {
    pub(crate) fn new(name: Name, inner: Arc<dyn SignerZone>) -> Self {
        Self {
            name: canonical_name(&name),
            inner,
        }
    }
}

#[async_trait]
impl SignerZone for WrappedZone {
    fn name(&self) -> &Name {
        &self.name
    }

    async fn dnskey_records(&self, ctx: &QueryContext) -> Result<Vec<Record>, ResolverError> {
        // Our keys, their servers.
        self.inner.lookup_dnskey(ctx, &self.name).await
    }

    async fn lookup_dnskey(
        &self,
        ctx: &QueryContext,
        qname: &Name,
    ) -> Result<Vec<Record>, ResolverError> {
        self.inner.lookup_dnskey(ctx, qname).await
    }

    async fn lookup_ds(
        &self,
        ctx: &QueryContext,
        qname: &Name,
    ) -> Result<Option<Message>, ResolverError> {
        self.inner.lookup_ds(ctx, qname).await
    }
}

/// One RRSIG, the key that (maybe) verified it, and the rrset it covers.
#[derive(Clone, Debug)]
pub(crate) struct SignatureRecord {
    pub zone: Name,
    pub name: Name,
    pub rtype: RecordType,
    pub algorithm: u8,
    pub key_tag: u16,
    pub labels: u8,
    pub original_ttl: u32,
    pub expiration: u32,
    pub inception: u32,
    pub signer_name: Name,
    pub sig: Vec<u8>,
    pub rrset: Vec<Record>,
    pub key: Option<DNSKEY>,
    pub wildcard: bool,
    pub verified: bool,
    pub err: Option<ResolverError>,
}

/// Everything the verifier concluded about one response on the chain.
#[derive(Debug)]
pub(crate) struct ZoneResult {
    pub zone_name: Name,
    pub question: Option<Query>,
    pub msg: Option<Message>,
    pub keys: Vec<SignatureRecord>,
    pub answer: Vec<SignatureRecord>,
    pub authority: Vec<SignatureRecord>,
    pub ds_records: Vec<DS>,
    pub state: AuthState,
    pub doe: DoeState,
    pub err: Option<ResolverError>,
}

impl ZoneResult {
    pub(crate) fn new(zone_name: Name, msg: Option<Message>) -> Self {
        let question = msg.as_ref().and_then(|m| m.queries().first().cloned());
        Self {
            zone_name,
            question,
            msg,
            keys: Vec::new(),
            answer: Vec::new(),
            authority: Vec::new(),
            ds_records: Vec::new(),
            state: AuthState::Unknown,
            doe: DoeState::NotFound,
            err: None,
        }
    }
}

/// DS records pulled out of a verified signature set.
pub(crate) fn extract_ds_records(signatures: &[SignatureRecord]) -> Vec<DS> {
    let mut ds = Vec::new();
    for sig in signatures {
        for record in &sig.rrset {
            if let hickory_proto::rr::RData::DNSSEC(
                hickory_proto::dnssec::rdata::DNSSECRData::DS(record),
            ) = record.data()
            {
                ds.push(record.clone());
            }
        }
    }
    ds
}
