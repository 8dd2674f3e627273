#![allow(dead_code)]

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::{A, CNAME, NS, SOA};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use rootward::transport::{DnsTransport, Protocol, TransportFactory};
use rootward::ResolverError;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::Duration;

pub type Handler =
    dyn Fn(Protocol, SocketAddr, &Message) -> Option<Message> + Send + Sync + 'static;

/// A transport factory that answers from a closure instead of the network.
/// The closure sees the protocol, the target server and the decoded query,
/// and returns the message to send back (or `None` for a dead server).
pub struct MockTransportFactory {
    handler: Arc<Handler>,
    pub queries: Arc<AtomicU32>,
}

impl MockTransportFactory {
    pub fn new(
        handler: impl Fn(Protocol, SocketAddr, &Message) -> Option<Message>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Arc::new(handler),
            queries: Arc::new(AtomicU32::new(0)),
        })
    }
}

impl TransportFactory for MockTransportFactory {
    fn transport(&self, protocol: Protocol, server: SocketAddr) -> Arc<dyn DnsTransport> {
        Arc::new(MockTransport {
            protocol,
            server,
            handler: Arc::clone(&self.handler),
            queries: Arc::clone(&self.queries),
        })
    }
}

struct MockTransport {
    protocol: Protocol,
    server: SocketAddr,
    handler: Arc<Handler>,
    queries: Arc<AtomicU32>,
}

#[async_trait]
impl DnsTransport for MockTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        _timeout: Duration,
    ) -> Result<Vec<u8>, ResolverError> {
        self.queries
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let query = Message::from_vec(message_bytes)
            .map_err(|e| ResolverError::MessageFormat(e.to_string()))?;

        match (self.handler)(self.protocol, self.server, &query) {
            Some(mut response) => {
                response.set_id(query.id());
                response
                    .to_vec()
                    .map_err(|e| ResolverError::MessageFormat(e.to_string()))
            }
            None => Err(ResolverError::Transport {
                server: self.server.to_string(),
                reason: "no response".to_string(),
            }),
        }
    }
}

pub fn name(s: &str) -> Name {
    Name::from_str(s).unwrap()
}

pub fn ip(s: &str) -> IpAddr {
    IpAddr::from_str(s).unwrap()
}

pub fn query(qname: &str, qtype: RecordType) -> Message {
    let mut msg = Message::new();
    msg.set_id(fastrand::u16(..));
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    msg.add_query(Query::query(name(qname), qtype));
    msg
}

/// A query with EDNS(0) and the DO bit, i.e. one that asks for validation.
pub fn dnssec_query(qname: &str, qtype: RecordType) -> Message {
    let mut msg = query(qname, qtype);
    let mut edns = hickory_proto::op::Edns::new();
    edns.set_max_payload(4096);
    edns.set_dnssec_ok(true);
    edns.set_version(0);
    msg.set_edns(edns);
    msg
}

pub fn a_record(owner: &str, addr: &str) -> Record {
    let IpAddr::V4(v4) = ip(addr) else {
        panic!("a_record takes an IPv4 address");
    };
    Record::from_rdata(name(owner), 300, RData::A(A(v4)))
}

pub fn ns_record(owner: &str, host: &str) -> Record {
    Record::from_rdata(name(owner), 300, RData::NS(NS(name(host))))
}

pub fn cname_record(owner: &str, target: &str) -> Record {
    Record::from_rdata(name(owner), 300, RData::CNAME(CNAME(name(target))))
}

pub fn soa_record(owner: &str) -> Record {
    Record::from_rdata(
        name(owner),
        300,
        RData::SOA(SOA::new(
            name("ns1.invalid."),
            name("hostmaster.invalid."),
            1,
            7200,
            3600,
            1_209_600,
            300,
        )),
    )
}

fn reply_to(request: &Message) -> Message {
    let mut msg = Message::new();
    msg.set_id(request.id());
    msg.set_message_type(MessageType::Response);
    msg.set_op_code(OpCode::Query);
    if let Some(q) = request.queries().first() {
        msg.add_query(q.clone());
    }
    msg
}

/// A referral: NS records in the authority section, glue in additionals.
pub fn delegation(request: &Message, zone: &str, ns_host: &str, glue: &str) -> Message {
    let mut msg = reply_to(request);
    msg.add_name_server(ns_record(zone, ns_host));
    msg.add_additional(a_record(ns_host, glue));
    msg
}

/// An authoritative answer.
pub fn answer(request: &Message, records: Vec<Record>) -> Message {
    let mut msg = reply_to(request);
    msg.set_authoritative(true);
    for record in records {
        msg.add_answer(record);
    }
    msg
}

/// An authoritative NXDOMAIN with the zone's SOA in the authority section.
pub fn nxdomain(request: &Message, zone: &str) -> Message {
    let mut msg = reply_to(request);
    msg.set_authoritative(true);
    msg.set_response_code(ResponseCode::NXDomain);
    msg.add_name_server(soa_record(zone));
    msg
}

/// An authoritative empty NOERROR (NODATA or a SOA miss).
pub fn empty_answer(request: &Message) -> Message {
    let mut msg = reply_to(request);
    msg.set_authoritative(true);
    msg
}
