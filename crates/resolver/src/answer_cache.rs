use async_trait::async_trait;
use hickory_proto::op::{Message, Query};
use hickory_proto::rr::Name;
use rootward_domain::ResolverError;

/// Optional hook a zone consults before asking its nameservers, and offers
/// successful responses back to. Implementations own their eviction and
/// TTL policies; the resolver only ever clones what it gets back.
#[async_trait]
pub trait AnswerCache: Send + Sync {
    async fn get(&self, zone: &Name, question: &Query)
        -> Result<Option<Message>, ResolverError>;

    async fn update(
        &self,
        zone: &Name,
        question: &Query,
        msg: &Message,
    ) -> Result<(), ResolverError>;
}
