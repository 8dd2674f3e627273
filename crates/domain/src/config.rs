use std::time::Duration;

/// Process-wide resolver tuning.
///
/// One instance is shared (behind an `Arc`) by the engine, the nameserver
/// pools and the DNSSEC verifier. Everything has a sensible default; the
/// `with_*` builders exist for the handful of knobs callers actually turn.
#[derive(Clone, Debug)]
pub struct ResolverConfig {
    /// Upper bound applied to every cache expiry derived from a TTL, in
    /// seconds. Shorter TTLs on received records are still respected.
    pub max_allowed_ttl: u32,

    /// Ceiling on the number of lookups a single `exchange` call may make,
    /// from the root to the leaf plus any enrichment. DNSKEY and DS lookups
    /// are excluded. Its main task is to stop delegation loops.
    pub max_queries_per_request: u32,

    /// The number of nameservers, with addresses, we ideally hold per zone.
    /// Below this (and with hostnames still unresolved) a pool is considered
    /// worth enriching.
    pub desired_nameservers_per_zone: usize,

    /// When true, pools that are usable but below the desired server count
    /// are not enriched in the background.
    pub lazy_enrichment: bool,

    /// Clear the answer, authority and additional sections of a Bogus
    /// response, per RFC 4035 §5.5.
    pub suppress_bogus_response_sections: bool,

    /// Drop the authority section from positive answers when it carries no
    /// SOA (it then only restates nameservers).
    pub remove_authority_section_for_positive_answers: bool,

    /// Drop the additional section from positive answers. EDNS options
    /// survive regardless.
    pub remove_additional_section_for_positive_answers: bool,

    /// Per-attempt UDP timeout.
    pub timeout_udp: Duration,

    /// Per-attempt TCP timeout.
    pub timeout_tcp: Duration,

    /// When true, every RRSIG covering an rrset must verify for the rrset
    /// to be accepted. The default accepts an rrset once any one of its
    /// signatures verifies (RFC 4035 §5.3.3 leaves the policy local).
    pub require_all_signatures_valid: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_allowed_ttl: 60 * 60 * 48,
            max_queries_per_request: 100,
            desired_nameservers_per_zone: 3,
            lazy_enrichment: false,
            suppress_bogus_response_sections: true,
            remove_authority_section_for_positive_answers: true,
            remove_additional_section_for_positive_answers: true,
            timeout_udp: Duration::from_millis(150),
            timeout_tcp: Duration::from_millis(600),
            require_all_signatures_valid: false,
        }
    }
}

impl ResolverConfig {
    pub fn with_max_queries_per_request(mut self, max: u32) -> Self {
        self.max_queries_per_request = max;
        self
    }

    pub fn with_timeouts(mut self, udp: Duration, tcp: Duration) -> Self {
        self.timeout_udp = udp;
        self.timeout_tcp = tcp;
        self
    }

    pub fn with_lazy_enrichment(mut self) -> Self {
        self.lazy_enrichment = true;
        self
    }

    pub fn with_all_signatures_required(mut self) -> Self {
        self.require_all_signatures_valid = true;
        self
    }
}
