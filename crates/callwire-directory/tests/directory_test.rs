use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use callwire_directory::{
    ContextDefaults, ContextSource, DirectoryClient, DirectoryConfig, DirectoryError,
    GreetingConfig,
};
use callwire_types::SessionCode;
use serde_json::json;

// "AC1:secret" in base64.
const EXPECTED_AUTH: &str = "Basic QUMxOnNlY3JldA==";

async fn item(
    Path((service, map, code)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == EXPECTED_AUTH)
        .unwrap_or(false);
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "bad credentials"})),
        );
    }
    if service != "IS1" || map != "MP1" {
        return (StatusCode::NOT_FOUND, Json(json!({})));
    }
    match code.as_str() {
        "A1B2" => (
            StatusCode::OK,
            Json(json!({
                "key": "A1B2",
                "data": {
                    "participant": {
                        "firstName": "Ada",
                        "email": "ada@example.com",
                        "number": "+15550100"
                    },
                    "scenario": "estates"
                }
            })),
        ),
        "BROKEN" => (StatusCode::OK, Json(json!({"key": "BROKEN"}))),
        "FLAKY" => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))),
        _ => (StatusCode::NOT_FOUND, Json(json!({"status": 404}))),
    }
}

async fn start_directory() -> String {
    let app = Router::new().route(
        "/v1/Services/{service}/Maps/{map}/Items/{code}",
        get(item),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{}/v1", addr)
}

fn config(base_url: String) -> DirectoryConfig {
    DirectoryConfig {
        base_url,
        account_sid: "AC1".to_string(),
        auth_token: "secret".to_string(),
        service_sid: "IS1".to_string(),
        map_sid: "MP1".to_string(),
        timeout_secs: 2,
    }
}

fn code(raw: &str) -> SessionCode {
    SessionCode::parse(raw).expect("valid code")
}

#[tokio::test]
async fn fetch_call_info_decodes_participant() {
    let base = start_directory().await;
    let client = DirectoryClient::new(config(base), GreetingConfig::default()).expect("client");

    let info = client.fetch_call_info(&code("A1B2")).await.expect("found");
    assert_eq!(info.participant.first_name.as_deref(), Some("Ada"));
    assert_eq!(info.participant.email.as_deref(), Some("ada@example.com"));
    assert_eq!(info.scenario.as_deref(), Some("estates"));
}

#[tokio::test]
async fn fetch_call_info_maps_error_statuses() {
    let base = start_directory().await;
    let client = DirectoryClient::new(config(base.clone()), GreetingConfig::default())
        .expect("client");

    assert!(matches!(
        client.fetch_call_info(&code("ZZZZ")).await,
        Err(DirectoryError::NotFound(c)) if c == "ZZZZ"
    ));
    assert!(matches!(
        client.fetch_call_info(&code("FLAKY")).await,
        Err(DirectoryError::Status(500))
    ));
    assert!(matches!(
        client.fetch_call_info(&code("BROKEN")).await,
        Err(DirectoryError::Decode(_))
    ));

    let mut wrong = config(base);
    wrong.auth_token = "nope".to_string();
    let client = DirectoryClient::new(wrong, GreetingConfig::default()).expect("client");
    assert!(matches!(
        client.fetch_call_info(&code("A1B2")).await,
        Err(DirectoryError::Status(401))
    ));
}

#[tokio::test]
async fn unconfigured_directory_is_disabled() {
    let client = DirectoryClient::new(DirectoryConfig::default(), GreetingConfig::default())
        .expect("client");
    assert!(!client.is_enabled());
    assert!(matches!(
        client.fetch_call_info(&code("A1B2")).await,
        Err(DirectoryError::Disabled)
    ));

    let ctx = client
        .resolve_context(&code("A1B2"), &ContextDefaults::default())
        .await;
    assert_eq!(ctx.source, ContextSource::Fallback);
    assert_eq!(ctx.first_name, "John");
}

#[tokio::test]
async fn resolve_context_uses_directory_entry() {
    let base = start_directory().await;
    let mut greeting = GreetingConfig::default();
    greeting.assistants.estates = Some("UA-estates".to_string());
    let client = DirectoryClient::new(config(base), greeting).expect("client");

    let ctx = client
        .resolve_context(&code("A1B2"), &ContextDefaults::default())
        .await;
    assert_eq!(ctx.source, ContextSource::Directory);
    assert_eq!(ctx.first_name, "Ada");
    assert_eq!(ctx.identity, "email:ada@example.com");
    assert_eq!(ctx.scenario, "estates");
    assert_eq!(ctx.assistant_id.as_deref(), Some("UA-estates"));
    assert!(ctx.greeting.contains("Ada"));
}

#[tokio::test]
async fn resolve_context_falls_back_when_directory_unreachable() {
    // Bind then drop so the port refuses connections.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let client = DirectoryClient::new(
        config(format!("http://{}/v1", addr)),
        GreetingConfig::default(),
    )
    .expect("client");
    let defaults = ContextDefaults {
        first_name: Some("Grace".to_string()),
        email: Some("grace@example.com".to_string()),
        scenario: Some("healthcare".to_string()),
    };

    let ctx = client.resolve_context(&code("A1B2"), &defaults).await;
    assert_eq!(ctx.source, ContextSource::Fallback);
    assert_eq!(ctx.first_name, "Grace");
    assert_eq!(ctx.identity, "email:grace@example.com");
    assert_eq!(ctx.scenario, "healthcare");
}

#[tokio::test]
async fn resolve_context_falls_back_on_missing_entry() {
    let base = start_directory().await;
    let client = DirectoryClient::new(config(base), GreetingConfig::default()).expect("client");

    let ctx = client
        .resolve_context(&code("NOPE"), &ContextDefaults::default())
        .await;
    assert_eq!(ctx.source, ContextSource::Fallback);
    assert_eq!(ctx.session_id, "NOPE");
    assert_eq!(ctx.email, "john@example.com");
}
