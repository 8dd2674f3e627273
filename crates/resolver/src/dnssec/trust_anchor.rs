//! The root zone's trust anchors, embedded as DS records.
//!
//! Source: <https://data.iana.org/root-anchors/root-anchors.xml>. These
//! rotate on the order of years; KSK-2024 is published alongside KSK-2017
//! well before it signs anything.

use data_encoding::HEXUPPER_PERMISSIVE;
use hickory_proto::dnssec::rdata::DS;
use hickory_proto::dnssec::{Algorithm, DigestType};

/// (key tag, SHA-256 digest) pairs for the root KSKs currently valid.
const ROOT_ANCHOR_DIGESTS: [(u16, &str); 2] = [
    (
        20326,
        "E06D44B80B8F1D39A95C0B0D7C65D08458E880409BBC683457104237C7F8EC8D",
    ),
    (
        38696,
        "683D2D0ACB8C9B712A1948B27F741219298D0A450D612C483AF444A4C0FB2B16",
    ),
];

/// The DS set every chain of trust starts from.
pub fn root_trust_anchors() -> Vec<DS> {
    ROOT_ANCHOR_DIGESTS
        .iter()
        .filter_map(|(key_tag, digest)| {
            let digest = HEXUPPER_PERMISSIVE.decode(digest.as_bytes()).ok()?;
            Some(DS::new(
                *key_tag,
                Algorithm::RSASHA256,
                DigestType::SHA256,
                digest,
            ))
        })
        .collect()
}
