use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use shared::domain::{ChannelSid, MessageSid, UserIdentity};

/// Media attachment carried by a provider message. The content URL is
/// pre-resolved by the provider backend and is only valid short-term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMedia {
    pub content_type: String,
    pub content_url: String,
}

/// One message as reported by the provider, either through a live
/// `MessageAdded` event or a catch-up fetch on a channel handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMessage {
    pub sid: MessageSid,
    pub channel_sid: ChannelSid,
    /// Monotonic per-channel sequence index assigned by the provider.
    pub index: i64,
    pub body: String,
    pub author: UserIdentity,
    pub sent_at: DateTime<Utc>,
    /// Arbitrary provider-side metadata; `friendlyName` is the display name.
    pub attributes: serde_json::Value,
    pub media: Option<ProviderMedia>,
}

impl ProviderMessage {
    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.get("friendlyName").and_then(|v| v.as_str())
    }
}

/// Fetch direction for paged message reads on a channel handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDirection {
    Forward,
    Backward,
}

#[derive(Debug, Clone)]
pub enum ChatEvent {
    TokenAboutToExpire,
    TokenExpired,
    ChannelJoined(Arc<dyn ChannelHandle>),
    ChannelLeft { channel_sid: ChannelSid },
    MessageAdded(ProviderMessage),
}

impl std::fmt::Debug for dyn ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("sid", &self.sid())
            .finish()
    }
}

/// Provider-side handle for one joined channel.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    fn sid(&self) -> ChannelSid;
    fn friendly_name(&self) -> Option<String>;
    fn attributes(&self) -> serde_json::Value;
    /// Sequence index of the channel's latest message, `None` when empty.
    fn last_message_index(&self) -> Option<i64>;
    fn last_consumed_message_index(&self) -> Option<i64>;
    async fn get_messages(
        &self,
        count: u32,
        anchor: Option<i64>,
        direction: FetchDirection,
    ) -> anyhow::Result<Vec<ProviderMessage>>;
    async fn send_message(&self, body: &str, attributes: serde_json::Value) -> anyhow::Result<()>;
    async fn set_all_messages_consumed(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ChatSession: Send + Sync {
    fn identity(&self) -> UserIdentity;
    fn friendly_name(&self) -> Option<String>;
    /// Rotates the session credential in place; the session handle survives.
    async fn update_token(&self, token: &str) -> anyhow::Result<()>;
    fn subscribe_events(&self) -> broadcast::Receiver<ChatEvent>;
}

#[async_trait]
pub trait ChatConnector: Send + Sync {
    async fn connect(&self, token: &str) -> anyhow::Result<Arc<dyn ChatSession>>;
}

pub struct MissingChatConnector;

#[async_trait]
impl ChatConnector for MissingChatConnector {
    async fn connect(&self, _token: &str) -> anyhow::Result<Arc<dyn ChatSession>> {
        Err(anyhow!("chat provider backend is unavailable"))
    }
}
