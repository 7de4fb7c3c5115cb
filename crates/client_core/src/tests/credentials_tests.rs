use super::*;
use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct TokenServerState {
    seen_auth: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

async fn token_route(
    State(state): State<TokenServerState>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, StatusCode> {
    let auth = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state.seen_auth.lock().expect("lock").push(auth);

    if state.fail {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(TokenResponse {
        identity: "42".to_string(),
        twilio_token: "provider-token".to_string(),
    }))
}

async fn spawn_token_server(state: TokenServerState) -> String {
    let app = Router::new()
        .route("/chat/token", get(token_route))
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn fetch_token_returns_provider_token_and_sends_auth_header() {
    let state = TokenServerState::default();
    let seen_auth = Arc::clone(&state.seen_auth);
    let base = spawn_token_server(state).await;

    let source = HttpCredentialSource::new(base, "session-abc");
    let token = source.fetch_token().await.expect("token");

    assert_eq!(token, "provider-token");
    assert_eq!(*seen_auth.lock().expect("lock"), vec!["session-abc"]);
}

#[tokio::test]
async fn server_failure_collapses_to_unavailable() {
    let base = spawn_token_server(TokenServerState {
        fail: true,
        ..TokenServerState::default()
    })
    .await;

    let source = HttpCredentialSource::new(base, "session-abc");
    let err = source.fetch_token().await.expect_err("should fail");
    assert_eq!(err, CredentialError::Unavailable);
}

#[tokio::test]
async fn unreachable_server_collapses_to_unavailable() {
    // Port 9 is discard; nothing is listening in the test environment.
    let source = HttpCredentialSource::new("http://127.0.0.1:9", "session-abc");
    let err = source.fetch_token().await.expect_err("should fail");
    assert_eq!(err, CredentialError::Unavailable);
}
