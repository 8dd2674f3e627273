//! Denial-of-existence engines. Each is built from the *signed* authority
//! section of a response — by the time these run, every NSEC/NSEC3 rrset
//! has already had its signature checked.

pub(crate) mod nsec;
pub(crate) mod nsec3;

pub(crate) use nsec::NsecProofs;
pub(crate) use nsec3::Nsec3Proofs;
