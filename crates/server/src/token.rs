use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct ChatTokenConfig {
    pub account_sid: String,
    pub api_key: String,
    pub api_secret: String,
    pub service_sid: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatGrant {
    pub service_sid: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Grants {
    pub identity: String,
    pub chat: ChatGrant,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub jti: String,
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub grants: Grants,
}

/// Mints a provider access token granting chat access to the configured
/// service instance, signed with the API secret.
pub fn mint_token(
    cfg: &ChatTokenConfig,
    identity: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::seconds(cfg.ttl_seconds);
    let claims = Claims {
        jti: format!("{}-{}", cfg.api_key, uuid::Uuid::new_v4()),
        iss: cfg.api_key.clone(),
        sub: cfg.account_sid.clone(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
        grants: Grants {
            identity: identity.to_string(),
            chat: ChatGrant {
                service_sid: cfg.service_sid.clone(),
            },
        },
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.api_secret.as_bytes()),
    )
}

#[cfg(test)]
#[path = "tests/token_tests.rs"]
mod tests;
