use super::*;
use axum::{body, body::Body, http::Request};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use tower::ServiceExt;

const SESSION_SECRET: &str = "test-session-secret";

fn test_app() -> Router {
    build_router(Arc::new(AppState {
        chat: ChatTokenConfig {
            account_sid: "AC123".to_string(),
            api_key: "SK456".to_string(),
            api_secret: "topsecret".to_string(),
            service_sid: "IS789".to_string(),
            ttl_seconds: 86_400,
        },
        session_secret: SESSION_SECRET.to_string(),
    }))
}

fn session_token(identity: &str, secret: &str) -> String {
    let claims = SessionClaims {
        sub: identity.to_string(),
        exp: Utc::now().timestamp() + 600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("encode")
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = test_app();
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn chat_token_requires_authorization() {
    let app = test_app();
    let request = Request::get("/chat/token")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn chat_token_rejects_forged_session_token() {
    let app = test_app();
    let request = Request::get("/chat/token")
        .header("authorization", session_token("42", "wrong-secret"))
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn chat_token_returns_identity_and_provider_token() {
    let app = test_app();
    let request = Request::get("/chat/token")
        .header(
            "authorization",
            format!("Bearer {}", session_token("42", SESSION_SECRET)),
        )
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let dto: TokenResponse = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(dto.identity, "42");
    assert!(!dto.twilio_token.is_empty());

    // Wire field name is part of the client contract.
    let raw: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
    assert!(raw.get("twilioToken").is_some());
}

#[tokio::test]
async fn non_get_method_is_rejected_with_allow_header() {
    let app = test_app();
    let request = Request::post("/chat/token")
        .header(
            "authorization",
            format!("Bearer {}", session_token("42", SESSION_SECRET)),
        )
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let allow = response
        .headers()
        .get(axum::http::header::ALLOW)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(allow.contains("GET"), "allow header was '{allow}'");
}
