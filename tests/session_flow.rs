use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use httpmock::{Method::POST, MockServer};
use ragforge::{
    api::{AppState, create_router},
    conversation::{ApiKey, ConversationEngine, GeminiClient, MISSING_CREDENTIAL_REPLY},
    metrics::SessionMetrics,
    sequencer::InstantClock,
    session::{SessionOrchestrator, SessionState},
};
use serde_json::{Value, json};
use tower::ServiceExt;

const TWO_MIB: usize = 2 * 1024 * 1024;

fn harness(server: &MockServer) -> (Router, AppState) {
    let client = GeminiClient::new(server.base_url(), Duration::from_secs(5)).expect("client");
    let engine = ConversationEngine::new(
        Arc::new(client),
        ApiKey::new("integration-key"),
        Duration::from_secs(5),
    );
    let orchestrator = SessionOrchestrator::new(engine, Arc::new(SessionMetrics::new()));
    let state = AppState::new(orchestrator, Arc::new(InstantClock));
    (create_router(state.clone()), state)
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("router response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request")
}

async fn wait_for_state(state: &AppState, target: SessionState) {
    for _ in 0..200 {
        if state.session().lock().await.state() == target {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session never reached {target}");
}

#[tokio::test]
async fn upload_configure_process_and_chat_against_mocked_backend() {
    let server = MockServer::start_async().await;
    let gemini = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/models/gemini-2.5-flash:generateContent")
                .header("x-goog-api-key", "integration-key")
                .body_contains("\\\"spec.pdf\\\"")
                .body_contains("What is the operating voltage?");
            then.status(200).json_body(json!({
                "candidates": [{ "content": { "parts": [{ "text": "3.3V typical." }] } }]
            }));
        })
        .await;
    let (app, state) = harness(&server);

    let upload = Request::builder()
        .method(Method::POST)
        .uri("/session/document?name=spec.pdf")
        .header(header::CONTENT_TYPE, "application/pdf")
        .body(Body::from(vec![0u8; TWO_MIB]))
        .expect("upload request");
    let (status, document) = call(&app, upload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(document["name"], "spec.pdf");
    assert_eq!(document["size_mb"], "2.00");

    let (status, config) = call(
        &app,
        request(
            Method::PATCH,
            "/session/config",
            Some(json!({ "chunk_size": 256, "overlap": 32, "parser": "docling" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(config["overlap"], 32);

    let (status, started) = call(&app, request(Method::POST, "/session/process", None)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let kinds: Vec<_> = started["stages"]
        .as_array()
        .expect("stages")
        .iter()
        .map(|stage| stage["kind"].clone())
        .collect();
    assert_eq!(kinds, vec!["parse", "chunk", "embed", "index"]);

    wait_for_state(&state, SessionState::Chat).await;
    let (_, snapshot) = call(&app, request(Method::GET, "/session", None)).await;
    let transcript = snapshot["transcript"].as_array().expect("transcript");
    assert_eq!(transcript.len(), 1);
    let seed = transcript[0]["text"].as_str().expect("seed text");
    assert!(seed.contains("\"spec.pdf\""));
    assert!(seed.contains("256-token chunks"));
    assert_eq!(
        snapshot["recent_log"],
        json!(["> Generating Embeddings...", "  Done.", "> Building Vector Index...", "  Done."])
    );

    let (status, reply) = call(
        &app,
        request(
            Method::POST,
            "/session/messages",
            Some(json!({ "text": "What is the operating voltage?" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["message"]["text"], "3.3V typical.");
    assert_eq!(gemini.hits_async().await, 1);

    state.session().lock().await.update_credential(None);
    let (status, refusal) = call(
        &app,
        request(
            Method::POST,
            "/session/messages",
            Some(json!({ "text": "And the current draw?" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refusal["message"]["text"], MISSING_CREDENTIAL_REPLY);
    assert_eq!(gemini.hits_async().await, 1);

    let (_, snapshot) = call(&app, request(Method::GET, "/session", None)).await;
    let roles: Vec<_> = snapshot["transcript"]
        .as_array()
        .expect("transcript")
        .iter()
        .map(|message| message["role"].clone())
        .collect();
    assert_eq!(roles, vec!["model", "user", "model", "model"]);
    assert_eq!(snapshot["has_credential"], false);
}

#[tokio::test]
async fn backend_error_becomes_assistant_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(500).json_body(json!({
                "error": { "message": "backend exploded", "status": "INTERNAL" }
            }));
        })
        .await;
    let (app, state) = harness(&server);

    let upload = Request::builder()
        .method(Method::POST)
        .uri("/session/document?name=manual.pdf")
        .body(Body::from(b"%PDF-1.4".to_vec()))
        .expect("upload request");
    let (status, _) = call(&app, upload).await;
    assert_eq!(status, StatusCode::OK);
    call(&app, request(Method::POST, "/session/process", None)).await;
    wait_for_state(&state, SessionState::Chat).await;

    let (status, reply) = call(
        &app,
        request(Method::POST, "/session/messages", Some(json!({ "text": "Pinout?" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let text = reply["message"]["text"].as_str().expect("text");
    assert!(text.starts_with("Error querying document:"));
    assert!(text.contains("INTERNAL: backend exploded"));

    let (_, metrics) = call(&app, request(Method::GET, "/metrics", None)).await;
    assert_eq!(metrics["backend_failures"], 1);
    assert_eq!(state.session().lock().await.state(), SessionState::Chat);
}
