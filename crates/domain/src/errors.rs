use hickory_proto::rr::Name;
use thiserror::Error;

/// Every error the resolver surfaces at its public boundary.
///
/// Transport and wire-format failures are carried as strings so the error
/// stays `Clone` — a response can be both populated and errored, and may be
/// duplicated into logs and caches.
#[derive(Error, Debug, Clone)]
pub enum ResolverError {
    #[error("only recursive queries are supported via this resolver")]
    NotRecursionDesired,

    #[error("message without a question sent to exchange in zone [{zone}]")]
    NilMessageSentToExchange { zone: String },

    #[error("no nameserver pool configured for zone [{0}]")]
    NoPoolConfiguredForZone(String),

    #[error("failed creating nameserver pool for zone [{zone}]: {reason}")]
    FailedCreatingZoneAndPool { zone: Name, reason: String },

    #[error("failed enriching nameserver pool for zone [{zone}]: {reason}")]
    FailedEnrichingPool { zone: Name, reason: String },

    #[error("the onward nameservers cannot be found")]
    NextNameserversNotFound,

    #[error("failed resolving answer for [{qname}]{}{}", .zone.as_ref().map(|z| format!(" in zone [{z}]")).unwrap_or_default(), .source.as_ref().map(|e| format!(": {e}")).unwrap_or_default())]
    UnableToResolveAnswer {
        qname: Name,
        zone: Option<Name>,
        source: Option<Box<ResolverError>>,
    },

    #[error("the received response is empty")]
    EmptyResponse,

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("max queries per request reached")]
    MaxQueriesPerRequestReached,

    #[error("failed looking up DNSKEY records for [{zone}]: {reason}")]
    FailedToGetDnskeys { zone: Name, reason: String },

    #[error("unsuccessful response code {0}")]
    UnsuccessfulResponseCode(String),

    #[error("transport failure talking to [{server}]: {reason}")]
    Transport { server: String, reason: String },

    #[error("failed to decode DNS message: {0}")]
    MessageFormat(String),

    // DNSSEC authentication errors.
    #[error("a DS record for [{0}] is needed to continue the chain of trust")]
    MissingDsRecord(Name),

    #[error("unable to fetch missing DS record for [{0}]")]
    UnableToFetchDsRecord(Name),

    #[error("the maximum number of DS record lookups has been reached")]
    DsLookupLoop,

    #[error("we've deemed the result bogus: {0}")]
    BogusResultFound(String),

    #[error("denial of existence records missing")]
    BogusDoeRecordsNotFound,

    #[error("denial of existence records missing for a wildcard-expanded answer")]
    BogusWildcardDoeNotFound,

    #[error("multiple wildcard signatures seen")]
    MultipleWildcardSignatures,

    #[error("the NS records in the authority section do not have matching owners")]
    NsRecordsHaveMismatchingOwners,

    #[error("[{child}] is not a subdomain of [{parent}]")]
    NotSubdomain { parent: Name, child: Name },

    #[error("two adjacent results in the chain share the name [{0}]")]
    SameName(Name),

    #[error("a response for zone [{0}] has already been accepted")]
    DuplicateInputForZone(Name),

    #[error("the signer name [{signer}] is not a parent of the qname [{qname}]")]
    SignerNameNotParentOfQName { signer: Name, qname: Name },

    #[error("rrsigs in the response contain multiple varying signer names: [{0}] and [{1}]")]
    MultipleVaryingSignerNames(Name, Name),

    #[error("no results were collected, so no conclusion can be offered")]
    NoResults,

    #[error("no dnskey records found for zone that match the parent ds records")]
    KeysNotFound,

    #[error("found {found} signatures but {expected} name/type combinations")]
    UnexpectedSignatureCount { found: usize, expected: usize },

    #[error("signer name [{signer}] does not match the zone's origin [{zone}]")]
    SignerNameMismatch { zone: Name, signer: Name },

    #[error("owner name has {owner_labels} labels but the rrsig labels field is {rrsig_labels}")]
    InvalidLabelCount { owner_labels: u8, rrsig_labels: u8 },

    #[error("current time is outside of the signature validity period")]
    InvalidTime,

    #[error("signature is invalid: {0}")]
    InvalidSignature(String),

    #[error("cannot verify an empty signature set")]
    SignatureSetEmpty,

    #[error("unable to determine if the response is delegating, positive or negative")]
    FailsafeResponse,
}

impl ResolverError {
    /// Wraps `self` as the cause of an "unable to resolve" failure.
    pub fn wrap_unable_to_resolve(self, qname: Name, zone: Option<Name>) -> ResolverError {
        ResolverError::UnableToResolveAnswer {
            qname,
            zone,
            source: Some(Box::new(self)),
        }
    }
}
