//! An iterative, recursion-providing DNS resolver that authenticates
//! answers with DNSSEC.
//!
//! Given a query with the recursion-desired flag set, the resolver walks
//! the delegation hierarchy from the bundled root hints towards the
//! nameservers authoritative for the query name, issuing non-recursive
//! queries to each zone in turn. With the DO bit set it additionally
//! proves the chain of trust from the root anchors down, follows CNAMEs,
//! and returns a single assembled response.
//!
//! ```no_run
//! use hickory_proto::op::{Message, MessageType, OpCode, Query};
//! use hickory_proto::rr::{Name, RecordType};
//! use std::str::FromStr;
//!
//! # async fn run() {
//! let resolver = rootward::Resolver::new();
//!
//! let mut query = Message::new();
//! query.set_id(fastrand::u16(..));
//! query.set_message_type(MessageType::Query);
//! query.set_op_code(OpCode::Query);
//! query.set_recursion_desired(true);
//! query.add_query(Query::query(
//!     Name::from_str("www.example.com.").unwrap(),
//!     RecordType::A,
//! ));
//!
//! let response = resolver.exchange(&query).await;
//! # let _ = response;
//! # }
//! ```

pub mod answer_cache;
pub mod context;
pub mod dnssec;
pub mod hints;
pub mod ipv6;
pub mod nameserver;
pub mod pool;
pub mod response;
pub mod transport;
pub mod walker;
pub mod zone;
pub mod zones;

mod resolver;
mod zone_factory;

pub use answer_cache::AnswerCache;
pub use context::QueryContext;
pub use dnssec::{AuthState, DoeState};
pub use resolver::{Resolver, ResolverBuilder};
pub use response::{Exchange, Response};
pub use rootward_domain::{ResolverConfig, ResolverError, Trace};
