//! Raw DNSSEC cryptography: key tags, DS digests and RRSIG verification
//! over the RFC 4034 §3.1.8.1 signed data.

use super::types::SignatureRecord;
use hickory_proto::dnssec::rdata::{DNSKEY, DS};
use hickory_proto::dnssec::PublicKey;
use hickory_proto::rr::{Name, Record};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};
use ring::signature;
use rootward_domain::record::canonical_name;
use rootward_domain::ResolverError;
use sha2::{Digest, Sha256, Sha384};

pub(crate) fn dnskey_algorithm(dnskey: &DNSKEY) -> u8 {
    u8::from(<dyn PublicKey>::algorithm(dnskey.public_key()))
}

/// The DNSKEY rdata in wire form: flags, protocol, algorithm, key.
fn dnskey_rdata_wire(dnskey: &DNSKEY) -> Vec<u8> {
    let key_bytes = <dyn PublicKey>::public_bytes(dnskey.public_key());
    let mut wire = Vec::with_capacity(4 + key_bytes.len());
    wire.extend_from_slice(&dnskey.flags().to_be_bytes());
    wire.push(3);
    wire.push(dnskey_algorithm(dnskey));
    wire.extend_from_slice(key_bytes);
    wire
}

/// RFC 4034 appendix B key tag: ones-complement-ish checksum of the rdata.
pub(crate) fn key_tag(dnskey: &DNSKEY) -> u16 {
    let wire = dnskey_rdata_wire(dnskey);

    let mut accumulator: u32 = 0;
    for chunk in wire.chunks(2) {
        if chunk.len() == 2 {
            accumulator += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
        } else {
            accumulator += u32::from(chunk[0]) << 8;
        }
    }

    accumulator += accumulator >> 16;
    (accumulator & 0xFFFF) as u16
}

/// Lowercased, uncompressed wire form of a name.
pub(crate) fn name_wire(name: &Name) -> Vec<u8> {
    let mut wire = Vec::with_capacity(name.len() + 1);
    for label in name.iter() {
        wire.push(label.len() as u8);
        wire.extend(label.iter().map(u8::to_ascii_lowercase));
    }
    wire.push(0);
    wire
}

/// Does this zone key match the delegation-signer record the parent holds
/// for it? Algorithm, key tag, and the digest over owner + rdata must all
/// line up.
pub(crate) fn dnskey_matches_ds(owner: &Name, dnskey: &DNSKEY, ds: &DS) -> bool {
    if ds.key_tag() != key_tag(dnskey) {
        return false;
    }
    if u8::from(ds.algorithm()) != dnskey_algorithm(dnskey) {
        return false;
    }

    let mut data = name_wire(owner);
    data.extend_from_slice(&dnskey_rdata_wire(dnskey));

    let computed = match u8::from(ds.digest_type()) {
        1 => ring::digest::digest(&ring::digest::SHA1_FOR_LEGACY_USE_ONLY, &data)
            .as_ref()
            .to_vec(),
        2 => Sha256::digest(&data).to_vec(),
        4 => Sha384::digest(&data).to_vec(),
        _ => return false,
    };

    computed == ds.digest()
}

/// The owner name an RRSIG actually signed: wildcard expansions are
/// reduced back to `*.<labels rightmost labels>` (RFC 4035 §5.3.2).
fn determine_name(owner: &Name, num_labels: u8) -> Name {
    if owner.num_labels() <= num_labels {
        return canonical_name(owner);
    }
    let trimmed = owner.trim_to(usize::from(num_labels));
    Name::from_ascii("*")
        .and_then(|star| star.append_domain(&trimmed))
        .unwrap_or(trimmed)
}

fn canonical_rdata(record: &Record) -> Result<Vec<u8>, ResolverError> {
    let mut buf = Vec::new();
    {
        let mut encoder = BinEncoder::new(&mut buf);
        encoder.set_canonical_names(true);
        record
            .data()
            .emit(&mut encoder)
            .map_err(|e| ResolverError::InvalidSignature(format!("cannot encode rdata: {e}")))?;
    }
    Ok(buf)
}

/// The signed data for one signature: the RRSIG rdata with the signature
/// field excluded, followed by the covered rrset in canonical form and
/// canonical order.
pub(crate) fn rrsig_signed_data(sig: &SignatureRecord) -> Result<Vec<u8>, ResolverError> {
    let mut data = Vec::new();
    data.extend_from_slice(&u16::from(sig.rtype).to_be_bytes());
    data.push(sig.algorithm);
    data.push(sig.labels);
    data.extend_from_slice(&sig.original_ttl.to_be_bytes());
    data.extend_from_slice(&sig.expiration.to_be_bytes());
    data.extend_from_slice(&sig.inception.to_be_bytes());
    data.extend_from_slice(&sig.key_tag.to_be_bytes());
    data.extend_from_slice(&name_wire(&sig.signer_name));

    let owner = determine_name(&sig.name, sig.labels);
    let owner_wire = name_wire(&owner);

    let mut rdatas = Vec::with_capacity(sig.rrset.len());
    for record in &sig.rrset {
        rdatas.push(canonical_rdata(record)?);
    }
    rdatas.sort();
    rdatas.dedup();

    for rdata in rdatas {
        data.extend_from_slice(&owner_wire);
        data.extend_from_slice(&u16::from(sig.rtype).to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&sig.original_ttl.to_be_bytes());
        data.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        data.extend_from_slice(&rdata);
    }

    Ok(data)
}

/// Checks `sig` against `key`. `Ok(())` means the signature cryptographically
/// verifies; anything else is a reason it does not.
pub(crate) fn verify_signature(
    sig: &SignatureRecord,
    key: &DNSKEY,
) -> Result<(), ResolverError> {
    let data = rrsig_signed_data(sig)?;
    let key_bytes = <dyn PublicKey>::public_bytes(key.public_key());

    match sig.algorithm {
        // RSA/SHA-256 and RSA/SHA-512.
        8 => verify_rsa(&data, &sig.sig, key_bytes, &signature::RSA_PKCS1_2048_8192_SHA256),
        10 => verify_rsa(&data, &sig.sig, key_bytes, &signature::RSA_PKCS1_2048_8192_SHA512),
        // ECDSA P-256/SHA-256 and P-384/SHA-384; DNSKEY stores the bare
        // X||Y point, ring wants it tagged uncompressed.
        13 => verify_ecdsa(&data, &sig.sig, key_bytes, &signature::ECDSA_P256_SHA256_FIXED, 64),
        14 => verify_ecdsa(&data, &sig.sig, key_bytes, &signature::ECDSA_P384_SHA384_FIXED, 96),
        15 => verify_ed25519(&data, &sig.sig, key_bytes),
        other => Err(ResolverError::InvalidSignature(format!(
            "unsupported signing algorithm {other}"
        ))),
    }
}

fn verify_rsa(
    data: &[u8],
    sig: &[u8],
    key_bytes: &[u8],
    params: &'static signature::RsaParameters,
) -> Result<(), ResolverError> {
    let (exponent, modulus) = parse_rsa_key(key_bytes)?;
    let components = signature::RsaPublicKeyComponents {
        n: modulus,
        e: exponent,
    };
    components
        .verify(params, data, sig)
        .map_err(|_| ResolverError::InvalidSignature("RSA verification failed".into()))
}

fn verify_ecdsa(
    data: &[u8],
    sig: &[u8],
    key_bytes: &[u8],
    params: &'static signature::EcdsaVerificationAlgorithm,
    point_len: usize,
) -> Result<(), ResolverError> {
    if key_bytes.len() != point_len {
        return Err(ResolverError::InvalidSignature(format!(
            "ECDSA public key must be {point_len} bytes, got {}",
            key_bytes.len()
        )));
    }
    if sig.len() != point_len {
        return Err(ResolverError::InvalidSignature(format!(
            "ECDSA signature must be {point_len} bytes, got {}",
            sig.len()
        )));
    }

    let mut uncompressed = Vec::with_capacity(point_len + 1);
    uncompressed.push(0x04);
    uncompressed.extend_from_slice(key_bytes);

    signature::UnparsedPublicKey::new(params, uncompressed)
        .verify(data, sig)
        .map_err(|_| ResolverError::InvalidSignature("ECDSA verification failed".into()))
}

fn verify_ed25519(data: &[u8], sig: &[u8], key_bytes: &[u8]) -> Result<(), ResolverError> {
    if key_bytes.len() != 32 {
        return Err(ResolverError::InvalidSignature(
            "Ed25519 public key must be 32 bytes".into(),
        ));
    }
    signature::UnparsedPublicKey::new(&signature::ED25519, key_bytes)
        .verify(data, sig)
        .map_err(|_| ResolverError::InvalidSignature("Ed25519 verification failed".into()))
}

/// RFC 3110 wire form: a one- or three-byte exponent length, the exponent,
/// then the modulus.
fn parse_rsa_key(key_data: &[u8]) -> Result<(&[u8], &[u8]), ResolverError> {
    let Some(&first) = key_data.first() else {
        return Err(ResolverError::InvalidSignature("empty RSA public key".into()));
    };

    let (exp_len, exp_start) = if first == 0 {
        if key_data.len() < 3 {
            return Err(ResolverError::InvalidSignature(
                "RSA key too short for long form".into(),
            ));
        }
        (
            usize::from(u16::from_be_bytes([key_data[1], key_data[2]])),
            3,
        )
    } else {
        (usize::from(first), 1)
    };

    let exp_end = exp_start + exp_len;
    if exp_end >= key_data.len() {
        return Err(ResolverError::InvalidSignature(
            "RSA exponent extends beyond key data".into(),
        ));
    }

    Ok((&key_data[exp_start..exp_end], &key_data[exp_end..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn name_wire_lowercases_and_terminates() {
        let name = Name::from_str("WwW.Example.COM.").unwrap();
        let wire = name_wire(&name);
        assert_eq!(
            wire,
            [
                &[3u8][..],
                b"www",
                &[7],
                b"example",
                &[3],
                b"com",
                &[0]
            ]
            .concat()
        );
    }

    #[test]
    fn root_name_wire_is_a_single_zero() {
        assert_eq!(name_wire(&Name::root()), vec![0]);
    }

    #[test]
    fn determine_name_reduces_wildcard_expansions() {
        let owner = Name::from_str("host.example.com.").unwrap();
        assert_eq!(determine_name(&owner, 3), canonical_name(&owner));
        assert_eq!(
            determine_name(&owner, 2).to_string(),
            "*.example.com."
        );
    }

    #[test]
    fn parse_rsa_key_handles_both_exponent_forms() {
        let short = [1u8, 0x03, 0xAA, 0xBB];
        let (e, n) = parse_rsa_key(&short).unwrap();
        assert_eq!(e, &[0x03]);
        assert_eq!(n, &[0xAA, 0xBB]);

        let long = [0u8, 0x00, 0x01, 0x03, 0xAA, 0xBB];
        let (e, n) = parse_rsa_key(&long).unwrap();
        assert_eq!(e, &[0x03]);
        assert_eq!(n, &[0xAA, 0xBB]);

        assert!(parse_rsa_key(&[]).is_err());
        assert!(parse_rsa_key(&[5, 1, 2]).is_err());
    }
}
