//! Provider webhook boundary.
//!
//! Webhook bodies are normalized into [`RelayEvent`]s here and handed to the
//! relay. A body that cannot be normalized is rejected as a whole and
//! changes no state.

use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use callwire_types::{CodeError, EventKind, IntelligenceRef, RelayEvent, SessionCode, Turn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

/// Body fields checked, in order, for the session code.
const SESSION_FIELDS: [&str; 3] = ["sessionId", "session_id", "customer_key"];

const STARTED_EVENTS: [&str; 2] = ["callStarted", "startCall"];
const ENDED_EVENTS: [&str; 2] = ["callEnded", "endCall"];
const STARTED_STATUSES: [&str; 2] = ["in-progress", "answered"];
const ENDED_STATUSES: [&str; 5] = ["completed", "busy", "failed", "no-answer", "canceled"];

/// Reasons a webhook body is rejected.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("request body must be a JSON object")]
    NotAnObject,

    #[error("no session code in query or body")]
    MissingSession,

    #[error("invalid session code: {0}")]
    InvalidSession(#[from] CodeError),

    #[error("transcript_sid must be a non-empty string")]
    InvalidTranscriptSid,

    #[error("invalid turns: {0}")]
    InvalidTurns(String),

    #[error("unrecognized webhook payload")]
    UnknownKind,

    #[error("expected an analysis-ready notification, got {0}")]
    UnexpectedKind(&'static str),
}

impl IntoResponse for EventError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (StatusCode::BAD_REQUEST, body).into_response()
    }
}

/// Query parameters accepted by the webhook routes.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookParams {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

fn code_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn resolve_session(query_code: Option<&str>, body: &Value) -> Result<SessionCode, EventError> {
    let raw = query_code
        .filter(|c| !c.trim().is_empty())
        .map(String::from)
        .or_else(|| {
            SESSION_FIELDS
                .iter()
                .find_map(|field| body.get(*field).and_then(code_value))
        })
        .ok_or(EventError::MissingSession)?;
    Ok(SessionCode::parse(&raw)?)
}

fn resolve_kind(body: &Value) -> Result<EventKind, EventError> {
    if body.get("transcript_sid").is_some() {
        let reference =
            IntelligenceRef::from_payload(body.clone()).ok_or(EventError::InvalidTranscriptSid)?;
        return Ok(EventKind::AnalysisReady(reference));
    }

    let event = body.get("event").and_then(Value::as_str);

    if let Some(turns) = body.get("turns") {
        if !turns.is_array() {
            return Err(EventError::InvalidTurns("turns must be an array".to_string()));
        }
        let turns: Vec<Turn> = serde_json::from_value(turns.clone())
            .map_err(|e| EventError::InvalidTurns(e.to_string()))?;
        let intro = body.get("intro").and_then(Value::as_bool).unwrap_or(false)
            || event == Some("aiIntro");
        return Ok(EventKind::TurnsBatch { turns, intro });
    }

    let status = body.get("CallStatus").and_then(Value::as_str);
    let is_any = |value: Option<&str>, set: &[&str]| value.is_some_and(|v| set.contains(&v));

    if is_any(event, &STARTED_EVENTS) || is_any(status, &STARTED_STATUSES) {
        Ok(EventKind::CallStarted)
    } else if is_any(event, &ENDED_EVENTS) || is_any(status, &ENDED_STATUSES) {
        Ok(EventKind::CallEnded)
    } else {
        Err(EventError::UnknownKind)
    }
}

/// Normalizes a webhook body into a relay event.
///
/// The session code comes from `query_code` when present, otherwise from
/// the body's `sessionId`, `session_id` or `customer_key` field.
pub fn normalize_webhook(query_code: Option<&str>, body: &Value) -> Result<RelayEvent, EventError> {
    if !body.is_object() {
        return Err(EventError::NotAnObject);
    }
    let session = resolve_session(query_code, body)?;
    let kind = resolve_kind(body)?;
    Ok(RelayEvent::new(session, kind))
}

fn parse_body(body: &[u8]) -> Result<Value, EventError> {
    serde_json::from_slice(body).map_err(|e| EventError::InvalidJson(e.to_string()))
}

async fn relay_event(state: &AppState, route: &'static str, event: RelayEvent) -> Json<Value> {
    let session = event.session.clone();
    let kind = event.kind.label();
    let outcome = state.relay.dispatch(event).await;
    tracing::info!(
        route,
        session = %session,
        kind,
        outcome = outcome.label(),
        "webhook relayed"
    );
    Json(json!({
        "success": true,
        "outcome": outcome.label(),
    }))
}

fn reject(route: &'static str, error: EventError) -> EventError {
    tracing::warn!(route, "dropping malformed webhook: {}", error);
    error
}

/// Handler for `POST /api/webhooks/call`.
pub async fn call_webhook_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<WebhookParams>,
    body: Bytes,
) -> Result<Json<Value>, EventError> {
    const ROUTE: &str = "call";
    let event = parse_body(&body)
        .and_then(|body| normalize_webhook(params.session_id.as_deref(), &body))
        .map_err(|e| reject(ROUTE, e))?;
    Ok(relay_event(&state, ROUTE, event).await)
}

/// Handler for `POST /api/voiceIntelligence`.
///
/// Accepts only analysis-ready notifications.
pub async fn voice_intelligence_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<WebhookParams>,
    body: Bytes,
) -> Result<Json<Value>, EventError> {
    const ROUTE: &str = "voiceIntelligence";
    let event = parse_body(&body)
        .and_then(|body| normalize_webhook(params.session_id.as_deref(), &body))
        .and_then(|event| {
            if matches!(event.kind, EventKind::AnalysisReady(_)) {
                Ok(event)
            } else {
                Err(EventError::UnexpectedKind(event.kind.label()))
            }
        })
        .map_err(|e| reject(ROUTE, e))?;
    Ok(relay_event(&state, ROUTE, event).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(body: Value) -> EventKind {
        normalize_webhook(Some("A1B2"), &body)
            .expect("body should normalize")
            .kind
    }

    #[test]
    fn session_code_resolution_order() {
        let body = json!({
            "sessionId": "BODY1",
            "session_id": "BODY2",
            "customer_key": "BODY3",
            "event": "callStarted"
        });
        let event = normalize_webhook(Some("QUERY"), &body).expect("normalize");
        assert_eq!(event.session.as_str(), "QUERY");

        let event = normalize_webhook(None, &body).expect("normalize");
        assert_eq!(event.session.as_str(), "BODY1");

        let event = normalize_webhook(
            Some("  "),
            &json!({"session_id": "BODY2", "event": "endCall"}),
        )
        .expect("normalize");
        assert_eq!(event.session.as_str(), "BODY2");

        let event = normalize_webhook(
            None,
            &json!({"customer_key": 4321, "CallStatus": "completed"}),
        )
        .expect("normalize");
        assert_eq!(event.session.as_str(), "4321");
    }

    #[test]
    fn turns_batches_and_intro_flag() {
        let body = json!({
            "turns": [
                {"id": "t1", "role": "user", "content": "hello"},
                {"id": "t2", "role": "tool", "name": "lookup", "input": {"q": 1}, "output": "ok"}
            ]
        });
        let EventKind::TurnsBatch { turns, intro } = kind(body) else {
            panic!("expected turns batch");
        };
        assert_eq!(turns.len(), 2);
        assert!(!intro);

        let intro_body = json!({
            "event": "aiIntro",
            "turns": [{"id": "a1", "role": "assistant", "content": "Hi"}]
        });
        assert!(matches!(kind(intro_body), EventKind::TurnsBatch { intro: true, .. }));

        let flagged = json!({"intro": true, "turns": []});
        assert!(matches!(kind(flagged), EventKind::TurnsBatch { intro: true, .. }));
    }

    #[test]
    fn lifecycle_events_and_call_status() {
        assert_eq!(kind(json!({"event": "callStarted"})), EventKind::CallStarted);
        assert_eq!(kind(json!({"event": "startCall"})), EventKind::CallStarted);
        assert_eq!(kind(json!({"CallStatus": "in-progress"})), EventKind::CallStarted);
        assert_eq!(kind(json!({"CallStatus": "answered"})), EventKind::CallStarted);
        assert_eq!(kind(json!({"event": "callEnded"})), EventKind::CallEnded);
        assert_eq!(kind(json!({"event": "endCall"})), EventKind::CallEnded);
        for status in ENDED_STATUSES {
            assert_eq!(kind(json!({"CallStatus": status})), EventKind::CallEnded);
        }
    }

    #[test]
    fn transcript_sid_wins_over_other_fields() {
        let EventKind::AnalysisReady(reference) =
            kind(json!({"transcript_sid": "GT1", "event": "callEnded", "turns": []}))
        else {
            panic!("expected analysis ready");
        };
        assert_eq!(reference.transcript_sid, "GT1");
        assert_eq!(reference.payload["event"], "callEnded");
    }

    #[test]
    fn malformed_bodies_are_rejected() {
        assert!(matches!(
            normalize_webhook(Some("A1B2"), &json!([1, 2])),
            Err(EventError::NotAnObject)
        ));
        assert!(matches!(
            normalize_webhook(None, &json!({"event": "callStarted"})),
            Err(EventError::MissingSession)
        ));
        assert!(matches!(
            normalize_webhook(Some("no spaces"), &json!({"event": "callStarted"})),
            Err(EventError::InvalidSession(CodeError::InvalidCharacter(' ')))
        ));
        assert!(matches!(
            normalize_webhook(Some("A1B2"), &json!({"transcript_sid": ""})),
            Err(EventError::InvalidTranscriptSid)
        ));
        assert!(matches!(
            normalize_webhook(Some("A1B2"), &json!({"turns": "nope"})),
            Err(EventError::InvalidTurns(_))
        ));
        assert!(matches!(
            normalize_webhook(Some("A1B2"), &json!({"turns": [{"id": "t1", "role": "narrator"}]})),
            Err(EventError::InvalidTurns(_))
        ));
        assert!(matches!(
            normalize_webhook(Some("A1B2"), &json!({"event": "ringing"})),
            Err(EventError::UnknownKind)
        ));
    }
}
