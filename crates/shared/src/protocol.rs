use serde::{Deserialize, Serialize};

/// Body of a successful `GET /chat/token` response.
///
/// The provider token is short-lived; clients are expected to re-request it
/// on the provider's expiry signals rather than cache it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub identity: String,
    #[serde(rename = "twilioToken")]
    pub twilio_token: String,
}
