use super::Resolver;
use crate::context::QueryContext;
use crate::response::Response;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RData, RecordType};
use rootward_domain::record::{canonical_name, is_do_set, records_of_name_and_type_exist, set_dnssec_ok};
use rootward_domain::ResolverError;
use tracing::debug;

impl Resolver {
    /// Resolves each CNAME target in the answer that isn't already
    /// answered, by issuing a fresh top-level query for it, and folds the
    /// extra legs into the response: sections appended, authentication
    /// states combined, AA only if every leg was authoritative, and the
    /// worst rcode wins.
    pub(crate) async fn follow_cnames(
        &self,
        ctx: &QueryContext,
        qmsg: &Message,
        response: &mut Response,
    ) -> Result<(), ResolverError> {
        let Some(question) = qmsg.queries().first() else {
            return Ok(());
        };
        let qtype = question.query_type();

        let Some(mut rmsg) = response.msg.take() else {
            return Ok(());
        };

        let targets: Vec<Name> = rmsg
            .answers()
            .iter()
            .filter_map(|record| match record.data() {
                RData::CNAME(cname) => Some(canonical_name(&cname.0)),
                _ => None,
            })
            .collect();

        debug!(
            trace = %ctx.trace.short_id(),
            qname = %question.name(),
            targets = ?targets.iter().map(Name::to_string).collect::<Vec<_>>(),
            "following cname chain"
        );

        for target in targets {
            if records_of_name_and_type_exist(rmsg.answers(), &target, qtype)
                || records_of_name_and_type_exist(rmsg.answers(), &target, RecordType::CNAME)
            {
                // Already answered within this message.
                continue;
            }

            let mut follow = Message::new();
            follow.set_id(fastrand::u16(..));
            follow.set_message_type(MessageType::Query);
            follow.set_op_code(OpCode::Query);
            follow.set_recursion_desired(true);
            follow.add_query(Query::query(target.clone(), qtype));
            if is_do_set(qmsg) {
                set_dnssec_ok(&mut follow);
            }

            let leg = Box::pin(self.resolve(ctx, follow)).await;

            if let Some(e) = leg.err {
                response.msg = Some(rmsg);
                return Err(e);
            }
            let Some(leg_msg) = leg.msg else {
                response.msg = Some(rmsg);
                return Err(ResolverError::UnableToResolveAnswer {
                    qname: target,
                    zone: None,
                    source: None,
                });
            };

            for record in leg_msg.answers() {
                rmsg.add_answer(record.clone());
            }
            for record in leg_msg.name_servers() {
                rmsg.add_name_server(record.clone());
            }
            for record in leg_msg.additionals() {
                rmsg.add_additional(record.clone());
            }

            response.auth = response.auth.combine(leg.auth);

            rmsg.set_authoritative(rmsg.authoritative() && leg_msg.authoritative());

            if u16::from(leg_msg.response_code()) > u16::from(rmsg.response_code()) {
                rmsg.set_response_code(leg_msg.response_code());
            }
        }

        response.msg = Some(rmsg);
        Ok(())
    }
}
