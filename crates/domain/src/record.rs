//! Small helpers over `hickory_proto` records and messages that the whole
//! resolver leans on: canonical names, typed section filtering and EDNS
//! probing.

use hickory_proto::op::{Edns, Message};
use hickory_proto::rr::{Name, Record, RecordType};

/// Lowercased, dot-terminated form of a name. All map keys and comparisons
/// in the resolver use this form.
pub fn canonical_name(name: &Name) -> Name {
    let mut canonical = name.to_lowercase();
    if !canonical.is_fqdn() {
        canonical.set_fqdn(true);
    }
    canonical
}

/// True when `child` sits strictly below `parent`.
pub fn is_strict_subdomain(parent: &Name, child: &Name) -> bool {
    parent.zone_of(child) && parent.num_labels() != child.num_labels()
}

pub fn records_of_type_exist(records: &[Record], rtype: RecordType) -> bool {
    records.iter().any(|r| r.record_type() == rtype)
}

pub fn records_of_name_and_type_exist(records: &[Record], name: &Name, rtype: RecordType) -> bool {
    records
        .iter()
        .any(|r| r.record_type() == rtype && canonical_name(r.name()) == canonical_name(name))
}

pub fn extract_records_of_type(records: &[Record], rtype: RecordType) -> Vec<Record> {
    records
        .iter()
        .filter(|r| r.record_type() == rtype)
        .cloned()
        .collect()
}

pub fn extract_records_of_name_and_type(
    records: &[Record],
    name: &Name,
    rtype: RecordType,
) -> Vec<Record> {
    let name = canonical_name(name);
    records
        .iter()
        .filter(|r| r.record_type() == rtype && canonical_name(r.name()) == name)
        .cloned()
        .collect()
}

pub fn remove_records_of_type(records: Vec<Record>, rtype: RecordType) -> Vec<Record> {
    records
        .into_iter()
        .filter(|r| r.record_type() != rtype)
        .collect()
}

pub fn records_have_same_owner(records: &[Record]) -> bool {
    match records.first() {
        None => true,
        Some(first) => {
            let owner = canonical_name(first.name());
            records[1..]
                .iter()
                .all(|r| canonical_name(r.name()) == owner)
        }
    }
}

/// Replaces the first label of `name` with `*`, e.g. `www.example.com.`
/// becomes `*.example.com.`.
pub fn wildcard_name(name: &Name) -> Name {
    let parent = name.base_name();
    Name::from_ascii("*")
        .and_then(|star| star.append_domain(&parent))
        .unwrap_or(parent)
}

/// The smallest TTL across `records`, if any.
pub fn min_ttl(records: &[Record]) -> Option<u32> {
    records.iter().map(Record::ttl).min()
}

/// Whether the message carries EDNS(0) with the DO bit set.
pub fn is_do_set(msg: &Message) -> bool {
    msg.extensions()
        .as_ref()
        .map(|edns| edns.flags().dnssec_ok)
        .unwrap_or(false)
}

/// Stamps the message with EDNS(0), a 4096-byte buffer and DO=1. Used for
/// every DNSSEC-relevant query.
pub fn set_dnssec_ok(msg: &mut Message) {
    let mut edns = Edns::new();
    edns.set_max_payload(4096);
    edns.set_dnssec_ok(true);
    edns.set_version(0);
    msg.set_edns(edns);
}
