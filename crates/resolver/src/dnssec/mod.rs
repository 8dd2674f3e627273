//! Streaming DNSSEC authentication for an iterative walk: one response per
//! zone along the delegation chain, verified strictly root → leaf against
//! the trust anchors.

pub mod authenticator;
pub(crate) mod crypto;
pub(crate) mod doe;
pub(crate) mod signatures;
pub mod trust_anchor;
pub mod types;
pub(crate) mod verifier;

#[cfg(test)]
pub(crate) mod test_support;

pub use authenticator::Authenticator;
pub use types::SignerZone;

use std::fmt;

/// The authentication verdict for a response, or for a whole chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    Unknown,
    Insecure,
    Secure,
    Bogus,
}

impl AuthState {
    /// Folds two verdicts into one, e.g. across the legs of a CNAME chain.
    /// Bogus taints everything; an Unknown leg means the whole answer is
    /// unvalidated; Insecure beats Secure.
    pub fn combine(self, other: AuthState) -> AuthState {
        use AuthState::*;
        match (self, other) {
            (Bogus, _) | (_, Bogus) => Bogus,
            (Unknown, _) | (_, Unknown) => Unknown,
            (Insecure, _) | (_, Insecure) => Insecure,
            (Secure, Secure) => Secure,
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "Unknown",
            Self::Insecure => "Insecure",
            Self::Secure => "Secure",
            Self::Bogus => "Bogus",
        };
        write!(f, "{s}")
    }
}

/// Which denial-of-existence proof, if any, a response carried.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DoeState {
    #[default]
    NotFound,

    NsecMissingDs,
    NsecNoData,
    NsecNxDomain,
    NsecWildcard,

    Nsec3MissingDs,
    Nsec3NoData,
    Nsec3NxDomain,
    Nsec3OptOut,
    Nsec3Wildcard,
}

impl fmt::Display for DoeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "NotFound",
            Self::NsecMissingDs => "NsecMissingDS",
            Self::NsecNoData => "NsecNoData",
            Self::NsecNxDomain => "NsecNxDomain",
            Self::NsecWildcard => "NsecWildcard",
            Self::Nsec3MissingDs => "Nsec3MissingDS",
            Self::Nsec3NoData => "Nsec3NoData",
            Self::Nsec3NxDomain => "Nsec3NxDomain",
            Self::Nsec3OptOut => "Nsec3OptOut",
            Self::Nsec3Wildcard => "Nsec3Wildcard",
        };
        write!(f, "{s}")
    }
}
