//! JSON bodies carried over HTTP. Every field is mandatory and unknown
//! fields are refused, so a partial or mistyped payload never decodes.
//!
//! Numbers are written as JSON integers. On input, decimal strings such as
//! `"5"` are also accepted, and heartbeats may use the `candidateTerm` /
//! `candidateId` names, so peers that stringify every field still interoperate.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

use crate::raft::{HeartbeatRequest, HeartbeatResponse, VoteRequest, VoteResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VoteRequestBody {
    #[serde(deserialize_with = "lenient_u64")]
    pub candidate_term: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub candidate_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VoteResponseBody {
    /// 1 for granted, 0 for denied.
    #[serde(deserialize_with = "lenient_u64")]
    pub decision: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub server_term: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HeartbeatBody {
    #[serde(alias = "candidateTerm", deserialize_with = "lenient_u64")]
    pub leader_term: u64,
    #[serde(alias = "candidateId", deserialize_with = "lenient_u64")]
    pub leader_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HeartbeatAckBody {
    #[serde(deserialize_with = "lenient_u64")]
    pub server_term: u64,
}

/// Non-negative integer given either as a JSON number or a decimal string.
fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct LenientU64;

    impl<'de> Visitor<'de> for LenientU64 {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer or decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            u64::try_from(v).map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
            if v.is_empty() || !v.bytes().all(|b| b.is_ascii_digit()) {
                return Err(E::invalid_value(de::Unexpected::Str(v), &self));
            }
            v.parse()
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }

    deserializer.deserialize_any(LenientU64)
}

pub fn decode_vote_request(bytes: &[u8]) -> Result<VoteRequest, String> {
    let body: VoteRequestBody = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    if body.candidate_id == 0 {
        return Err("candidateId must be >= 1".to_string());
    }
    Ok(VoteRequest {
        term: body.candidate_term,
        candidate_id: body.candidate_id,
    })
}

pub fn decode_heartbeat(bytes: &[u8]) -> Result<HeartbeatRequest, String> {
    let body: HeartbeatBody = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    if body.leader_id == 0 {
        return Err("leaderId must be >= 1".to_string());
    }
    Ok(HeartbeatRequest {
        term: body.leader_term,
        leader_id: body.leader_id,
    })
}

impl From<VoteRequest> for VoteRequestBody {
    fn from(req: VoteRequest) -> Self {
        Self {
            candidate_term: req.term,
            candidate_id: req.candidate_id,
        }
    }
}

impl From<VoteResponse> for VoteResponseBody {
    fn from(resp: VoteResponse) -> Self {
        Self {
            decision: u64::from(resp.vote_granted),
            server_term: resp.term,
        }
    }
}

impl TryFrom<VoteResponseBody> for VoteResponse {
    type Error = String;

    fn try_from(body: VoteResponseBody) -> Result<Self, Self::Error> {
        let vote_granted = match body.decision {
            0 => false,
            1 => true,
            other => return Err(format!("decision must be 0 or 1, got {other}")),
        };
        Ok(VoteResponse {
            term: body.server_term,
            vote_granted,
        })
    }
}

impl From<HeartbeatRequest> for HeartbeatBody {
    fn from(req: HeartbeatRequest) -> Self {
        Self {
            leader_term: req.term,
            leader_id: req.leader_id,
        }
    }
}

impl From<HeartbeatResponse> for HeartbeatAckBody {
    fn from(resp: HeartbeatResponse) -> Self {
        Self {
            server_term: resp.term,
        }
    }
}

impl From<HeartbeatAckBody> for HeartbeatResponse {
    fn from(body: HeartbeatAckBody) -> Self {
        HeartbeatResponse {
            term: body.server_term,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_request_uses_camel_case_fields() {
        let json = serde_json::to_string(&VoteRequestBody::from(VoteRequest {
            term: 3,
            candidate_id: 2,
        }))
        .unwrap();
        assert_eq!(json, r#"{"candidateTerm":3,"candidateId":2}"#);
    }

    #[test]
    fn decode_vote_request_accepts_well_formed_body() {
        let req = decode_vote_request(br#"{"candidateTerm":5,"candidateId":2}"#).unwrap();
        assert_eq!(req, VoteRequest { term: 5, candidate_id: 2 });
    }

    #[test]
    fn malformed_vote_requests_are_refused() {
        for body in [
            &br#"{"candidateTerm":5}"#[..],
            br#"{"candidateTerm":"five","candidateId":2}"#,
            br#"{"candidateTerm":"-5","candidateId":2}"#,
            br#"{"candidateTerm":"","candidateId":2}"#,
            br#"{"candidateTerm":true,"candidateId":2}"#,
            br#"{"candidateTerm":-1,"candidateId":2}"#,
            br#"{"candidateTerm":5,"candidateId":2,"extra":1}"#,
            br#"{"candidateTerm":5,"candidateId":0}"#,
            b"not json",
            b"",
        ] {
            assert!(
                decode_vote_request(body).is_err(),
                "accepted {}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn decimal_string_numbers_are_accepted() {
        let req = decode_vote_request(br#"{"candidateTerm":"7","candidateId":"3"}"#).unwrap();
        assert_eq!(req, VoteRequest { term: 7, candidate_id: 3 });

        let reply: VoteResponseBody =
            serde_json::from_str(r#"{"decision":"1","serverTerm":"7"}"#).unwrap();
        assert!(VoteResponse::try_from(reply).unwrap().vote_granted);

        let ack: HeartbeatAckBody = serde_json::from_str(r#"{"serverTerm":"4"}"#).unwrap();
        assert_eq!(HeartbeatResponse::from(ack).term, 4);
    }

    #[test]
    fn heartbeat_accepts_candidate_field_names() {
        let req = decode_heartbeat(br#"{"candidateTerm":"2","candidateId":"1"}"#).unwrap();
        assert_eq!(req, HeartbeatRequest { term: 2, leader_id: 1 });

        // Outbound heartbeats still use the leader names.
        let json = serde_json::to_string(&HeartbeatBody::from(req)).unwrap();
        assert_eq!(json, r#"{"leaderTerm":2,"leaderId":1}"#);
    }

    #[test]
    fn malformed_heartbeats_are_refused() {
        assert!(decode_heartbeat(br#"{"leaderTerm":1,"leaderId":1}"#).is_ok());
        assert!(decode_heartbeat(br#"{"leaderId":1}"#).is_err());
        assert!(decode_heartbeat(br#"{"leaderTerm":1.5,"leaderId":1}"#).is_err());
    }

    #[test]
    fn vote_response_decision_must_be_binary() {
        let granted = VoteResponse::try_from(VoteResponseBody { decision: 1, server_term: 4 }).unwrap();
        assert!(granted.vote_granted);
        assert_eq!(granted.term, 4);

        assert!(VoteResponse::try_from(VoteResponseBody { decision: 2, server_term: 4 }).is_err());

        let body = VoteResponseBody::from(VoteResponse { term: 7, vote_granted: false });
        assert_eq!(body.decision, 0);
        assert_eq!(body.server_term, 7);
    }
}
