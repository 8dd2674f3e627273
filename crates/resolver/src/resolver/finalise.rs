//! Post-processing of a terminal response: DNSSEC verdict stamping, CNAME
//! chasing, section hygiene, and the AD/CD/SERVFAIL contract.

use super::Resolver;
use crate::context::QueryContext;
use crate::dnssec::{Authenticator, AuthState};
use crate::response::Response;
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::{Record, RecordType};
use rootward_domain::record::records_of_type_exist;
use rootward_domain::ResolverError;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

impl Resolver {
    pub(crate) async fn finalise_response(
        &self,
        ctx: &QueryContext,
        auth: Option<&Arc<Authenticator>>,
        qmsg: &Message,
        mut response: Response,
    ) -> Response {
        if let Some(auth) = auth {
            let started = Instant::now();
            let (state, doe, err) = auth.result().await;
            response.auth = state;
            response.doe = doe;
            response.err = err;
            info!(
                trace = %ctx.trace.short_id(),
                elapsed = ?started.elapsed(),
                auth = %response.auth,
                doe = %response.doe,
                "dnssec authentication concluded"
            );
        }

        let question = qmsg.queries().first().cloned();

        // Chase any CNAMEs in the answer, unless CNAMEs are what was asked
        // for. The extra legs land in this same response.
        if let (Some(question), Some(rmsg)) = (question.as_ref(), response.msg.as_ref()) {
            if question.query_type() != RecordType::CNAME
                && records_of_type_exist(rmsg.answers(), RecordType::CNAME)
            {
                if let Err(e) = self.follow_cnames(ctx, qmsg, &mut response).await {
                    return Response::from_error(e);
                }
            }
        }

        if let Some(rmsg) = response.msg.as_ref() {
            // NoError and NXDomain are both ordinary outcomes; everything
            // else is a failure with the rcode spelled out.
            let rcode = rmsg.response_code();
            if rcode != ResponseCode::NoError && rcode != ResponseCode::NXDomain {
                response.err = Some(ResolverError::UnsuccessfulResponseCode(rcode.to_string()));
            }
        }

        if let Some(rmsg) = response.msg.as_mut() {
            let positive = !rmsg.answers().is_empty()
                && !records_of_type_exist(rmsg.name_servers(), RecordType::SOA);

            if positive && self.config.remove_authority_section_for_positive_answers {
                rmsg.take_name_servers();
            }
            // EDNS is held apart from the additional records, so clearing
            // the section leaves any OPT intact.
            if positive && self.config.remove_additional_section_for_positive_answers {
                rmsg.take_additionals();
            }

            let answers = dedup(rmsg.take_answers());
            rmsg.insert_answers(answers);
            let authority = dedup(rmsg.take_name_servers());
            rmsg.insert_name_servers(authority);
            let additionals = dedup(rmsg.take_additionals());
            rmsg.insert_additionals(additionals);
        }

        if auth.is_some() && !qmsg.checking_disabled() {
            if let Some(rmsg) = response.msg.as_mut() {
                rmsg.set_authentic_data(response.auth == AuthState::Secure);

                // A Bogus answer is withheld, not passed along
                // (RFC 4035 §5.5).
                if response.auth == AuthState::Bogus {
                    rmsg.set_response_code(ResponseCode::ServFail);
                    if self.config.suppress_bogus_response_sections {
                        rmsg.take_answers();
                        rmsg.take_name_servers();
                        rmsg.take_additionals();
                    }
                }
            }
        }

        response.elapsed = ctx.start.elapsed();
        response
    }
}

fn dedup(records: Vec<Record>) -> Vec<Record> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(record.to_string()))
        .collect()
}
