//! Internal relay event shape shared by every producer.

use crate::{SessionCode, Turn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reference to a post-call transcript analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelligenceRef {
    /// Provider identifier of the analysed transcript.
    pub transcript_sid: String,
    /// Full notification body as delivered by the provider.
    pub payload: Value,
}

impl IntelligenceRef {
    /// Extracts the reference from an analysis-ready notification body.
    ///
    /// Returns `None` when the body has no non-empty string `transcript_sid`.
    pub fn from_payload(payload: Value) -> Option<Self> {
        let transcript_sid = payload
            .get("transcript_sid")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|sid| !sid.is_empty())?
            .to_string();
        Some(Self {
            transcript_sid,
            payload,
        })
    }
}

/// What happened, independent of which producer reported it.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// New or re-delivered conversational turns, in provider order.
    ///
    /// `intro` marks the assistant's opening batch, which listeners render
    /// differently from ordinary history.
    TurnsBatch { turns: Vec<Turn>, intro: bool },
    /// The call was answered.
    CallStarted,
    /// The call ended (provider hang-up or client-initiated termination).
    CallEnded,
    /// A post-call transcript analysis is available.
    AnalysisReady(IntelligenceRef),
}

impl EventKind {
    /// Returns the label used in logs and webhook responses.
    pub fn label(&self) -> &'static str {
        match self {
            Self::TurnsBatch { .. } => "turnsBatch",
            Self::CallStarted => "callStarted",
            Self::CallEnded => "callEnded",
            Self::AnalysisReady(_) => "analysisReady",
        }
    }
}

/// An inbound event tagged with the session it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayEvent {
    pub session: SessionCode,
    pub kind: EventKind,
}

impl RelayEvent {
    pub fn new(session: SessionCode, kind: EventKind) -> Self {
        Self { session, kind }
    }
}
