//! On-wire envelope shapes for the agent messaging protocol.
//!
//! Two envelope kinds cross the channel: a request (call, publish, or
//! discovery) and a response. Payloads are opaque [`serde_json::Value`]s
//! passed through untouched; the channel never inspects them. The types
//! derive `Serialize`/`Deserialize` so a channel implementation backed by a
//! socket or message bus can frame them directly — the in-process channel
//! hands them over without encoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// What a request envelope asks the partition to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// Request/response invocation. Exactly one responder answers: the
    /// qualified target, or the partition's first registrant of the name.
    Call,
    /// Fire-and-forget. Every owner of the name (or only the qualified
    /// target) runs its binding; no response is ever sent.
    Publish,
    /// Registry discovery. Every agent on the partition answers with its
    /// exposed name list, even an empty one.
    Discover,
}

/// A request crossing the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Correlation id, matched against pending entries by the requester.
    pub request_id: Uuid,
    /// Qualified target agent id; `None` means "resolved by the partition".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// The invoked name. Unused (empty) for [`RequestKind::Discover`].
    pub name: String,
    /// Invocation arguments, opaque to the protocol layer.
    pub args: Vec<Value>,
    /// Request kind.
    pub kind: RequestKind,
}

/// Result payload of a response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseBody {
    /// The binding ran and produced a value.
    Ok(Value),
    /// The binding ran and failed; the message is propagated to the caller.
    Err(String),
    /// Discovery answer: the responder's exposed names in declaration order.
    Registrations(Vec<String>),
}

/// A response crossing the channel, correlated by `request_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Id of the request this answers.
    pub request_id: Uuid,
    /// Id of the agent that produced the answer.
    pub responder: String,
    /// Result payload.
    pub body: ResponseBody,
}

/// Any message deliverable on a channel partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Envelope {
    /// Outbound invocation or discovery probe.
    Request(RequestEnvelope),
    /// Answer to a previously broadcast request.
    Response(ResponseEnvelope),
}

impl Envelope {
    /// The correlation id carried by either envelope kind.
    pub fn request_id(&self) -> Uuid {
        match self {
            Envelope::Request(req) => req.request_id,
            Envelope::Response(resp) => resp.request_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
