use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::TokenResponse,
};
use tracing::{error, info};

mod config;
mod token;

use config::load_settings;
use token::{mint_token, ChatTokenConfig};

#[derive(Clone)]
struct AppState {
    chat: ChatTokenConfig,
    session_secret: String,
}

/// Claims of the application session token presented in `Authorization`.
#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    exp: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let state = AppState {
        chat: ChatTokenConfig {
            account_sid: settings.chat_account_sid,
            api_key: settings.chat_api_key,
            api_secret: settings.chat_api_secret,
            service_sid: settings.chat_service_sid,
            ttl_seconds: settings.chat_token_ttl_seconds,
        },
        session_secret: settings.session_secret,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "token service listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/chat/token", get(chat_token))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn chat_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, (StatusCode, Json<ApiError>)> {
    let identity = authenticate(&headers, &state.session_secret).map_err(|message| {
        (
            StatusCode::UNAUTHORIZED,
            Json(ApiError::new(ErrorCode::Unauthorized, message)),
        )
    })?;

    let twilio_token = mint_token(&state.chat, &identity).map_err(|err| {
        // Detail stays server-side; clients get a generic failure.
        error!(%err, %identity, "chat token mint failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::new(ErrorCode::Internal, "token generation failed")),
        )
    })?;

    Ok(Json(TokenResponse {
        identity,
        twilio_token,
    }))
}

fn authenticate(headers: &HeaderMap, session_secret: &str) -> Result<String, &'static str> {
    let raw = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or("missing authorization header")?;
    let raw = raw.strip_prefix("Bearer ").unwrap_or(raw);

    let decoded = decode::<SessionClaims>(
        raw,
        &DecodingKey::from_secret(session_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| "invalid session token")?;

    Ok(decoded.claims.sub)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
