use axum::body::Body;
use axum::http::{Request, StatusCode};
use callwire_directory::{DirectoryClient, DirectoryConfig, GreetingConfig};
use callwire_server::{app, AppState};
use callwire_session::{Listener, Relay, SessionRegistry, SessionUpdate};
use callwire_types::{Phase, SessionCode};
use serde_json::{json, Value};
use tower::ServiceExt;

fn setup() -> (axum::Router, Relay) {
    let relay = Relay::new(SessionRegistry::new());
    let directory = DirectoryClient::new(DirectoryConfig::default(), GreetingConfig::default())
        .expect("directory client");
    let state = AppState::new(relay.clone(), directory, 16);
    (app(state), relay)
}

fn code(raw: &str) -> SessionCode {
    SessionCode::parse(raw).unwrap()
}

async fn post(app: &axum::Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn turns_webhook_merges_and_deduplicates() {
    let (app, relay) = setup();
    let batch = json!({
        "sessionId": "A1B2",
        "turns": [{"id": "t1", "role": "user", "content": "hello"}]
    })
    .to_string();

    let (status, body) = post(&app, "/api/webhooks/call", &batch).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "outcome": "merged"}));

    let (status, body) = post(&app, "/api/webhooks/call", &batch).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "duplicate");

    let next = json!({
        "sessionId": "A1B2",
        "turns": [
            {"id": "t1", "role": "user", "content": "hello"},
            {"id": "t2", "role": "assistant", "content": "hi there"}
        ]
    })
    .to_string();
    post(&app, "/api/webhooks/call", &next).await;

    let snapshot = relay.registry().read(&code("A1B2")).await;
    let ids: Vec<&str> = snapshot.history.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["t1", "t2"]);
}

#[tokio::test]
async fn lifecycle_webhooks_drive_phase() {
    let (app, relay) = setup();

    let (_, body) = post(
        &app,
        "/api/webhooks/call?sessionId=A1B2",
        r#"{"CallStatus":"in-progress"}"#,
    )
    .await;
    assert_eq!(body["outcome"], "phase_applied");
    assert_eq!(relay.registry().read(&code("A1B2")).await.phase, Phase::Ongoing);

    let (_, body) = post(&app, "/api/webhooks/call?sessionId=A1B2", r#"{"event":"callEnded"}"#).await;
    assert_eq!(body["outcome"], "phase_applied");

    let (status, body) = post(
        &app,
        "/api/webhooks/call?sessionId=A1B2",
        r#"{"event":"callStarted"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "already_applied");
    assert_eq!(relay.registry().read(&code("A1B2")).await.phase, Phase::Ended);
}

#[tokio::test]
async fn voice_intelligence_webhook_is_write_once() {
    let (app, relay) = setup();
    let (listener, mut updates) = Listener::channel(16);
    relay.registry().subscribe(&code("A1B2"), &listener).await;
    assert!(matches!(updates.recv().await, Some(SessionUpdate::Joined(_))));

    let (status, body) = post(
        &app,
        "/api/voiceIntelligence?sessionId=A1B2",
        r#"{"transcript_sid":"GT1","account_sid":"AC1"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "intelligence_set");
    let Some(SessionUpdate::IntelligenceReady(reference)) = updates.recv().await else {
        panic!("expected intelligence notification");
    };
    assert_eq!(reference.transcript_sid, "GT1");

    let (_, body) = post(
        &app,
        "/api/voiceIntelligence",
        r#"{"transcript_sid":"GT2","customer_key":"A1B2"}"#,
    )
    .await;
    assert_eq!(body["outcome"], "already_applied");

    let snapshot = relay.registry().read(&code("A1B2")).await;
    assert_eq!(snapshot.intelligence.unwrap().transcript_sid, "GT1");
    // Analysis never moves the phase.
    assert_eq!(snapshot.phase, Phase::Ringing);
}

#[tokio::test]
async fn voice_intelligence_rejects_other_kinds() {
    let (app, relay) = setup();
    let (status, body) = post(
        &app,
        "/api/voiceIntelligence?sessionId=A1B2",
        r#"{"event":"callEnded"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(relay.registry().session_count(), 0);
}

#[tokio::test]
async fn malformed_webhooks_are_rejected_without_state_change() {
    let (app, relay) = setup();

    for (uri, body) in [
        ("/api/webhooks/call", "not json"),
        ("/api/webhooks/call", r#"{"event":"callStarted"}"#),
        ("/api/webhooks/call?sessionId=bad%20code", r#"{"event":"callStarted"}"#),
        ("/api/webhooks/call?sessionId=A1B2", r#"{"event":"somethingElse"}"#),
        (
            "/api/webhooks/call?sessionId=A1B2",
            r#"{"turns":[{"id":"t1","role":"user","content":"ok"},{"id":"t2","role":"ghost"}]}"#,
        ),
    ] {
        let (status, json) = post(&app, uri, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {body} should be rejected");
        assert_eq!(json["success"], false);
        assert!(json["error"].is_string());
    }

    assert_eq!(relay.registry().session_count(), 0);
}

#[tokio::test]
async fn webhooks_for_different_sessions_stay_isolated() {
    let (app, relay) = setup();
    let (listener_b, mut updates_b) = Listener::channel(16);
    relay.registry().subscribe(&code("B2C3"), &listener_b).await;
    assert!(matches!(updates_b.recv().await, Some(SessionUpdate::Joined(_))));

    post(
        &app,
        "/api/webhooks/call?sessionId=A1B2",
        r#"{"turns":[{"id":"t1","role":"user","content":"for A only"}]}"#,
    )
    .await;
    post(&app, "/api/webhooks/call?sessionId=A1B2", r#"{"event":"callStarted"}"#).await;

    assert!(updates_b.try_recv().is_err());
    assert!(relay.registry().read(&code("B2C3")).await.history.is_empty());
}
