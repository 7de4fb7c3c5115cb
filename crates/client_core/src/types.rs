use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use chat_provider::ProviderMessage;
use shared::domain::{ChannelSid, MessageSid, UserIdentity};
use storage::CachedMessage;

/// Discrete updates dispatched to the UI-facing reactive store.
#[derive(Debug, Clone)]
pub enum StoreAction {
    SetCurrentUser(UserIdentity),
    AddRoom(RoomView),
    RemoveRoom {
        room_sid: ChannelSid,
    },
    AppendMessage {
        room_sid: ChannelSid,
        message: RoomMessage,
    },
    RoomLoaded,
    ConsumedIndexUpdated {
        room_sid: ChannelSid,
        index: i64,
    },
}

/// Reconciled, UI-facing projection of one channel.
#[derive(Debug, Clone)]
pub struct RoomView {
    pub sid: ChannelSid,
    pub name: Option<String>,
    pub attributes: serde_json::Value,
    pub last_consumed_index: Option<i64>,
    /// Ordered by sequence index ascending.
    pub messages: Vec<RoomMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMessage {
    pub sid: MessageSid,
    pub index: i64,
    pub body: String,
    pub author: UserIdentity,
    pub author_display_name: String,
    pub sent_at: DateTime<Utc>,
    pub image_path: Option<PathBuf>,
}

impl RoomMessage {
    pub(crate) fn from_cached(cached: &CachedMessage, media_root: &Path) -> Self {
        let display_name = cached
            .meta
            .get("friendlyName")
            .and_then(|v| v.as_str())
            .unwrap_or(cached.author.as_str())
            .to_string();
        Self {
            sid: cached.sid.clone(),
            index: cached.message_index,
            body: cached.body.clone(),
            author: cached.author.clone(),
            author_display_name: display_name,
            sent_at: cached.sent_at,
            image_path: cached.image_name.as_deref().map(|n| media_root.join(n)),
        }
    }

    pub(crate) fn from_provider(
        message: &ProviderMessage,
        image_name: Option<&str>,
        media_root: &Path,
    ) -> Self {
        let display_name = message
            .friendly_name()
            .unwrap_or(message.author.as_str())
            .to_string();
        Self {
            sid: message.sid.clone(),
            index: message.index,
            body: message.body.clone(),
            author: message.author.clone(),
            author_display_name: display_name,
            sent_at: message.sent_at,
            image_path: image_name.map(|n| media_root.join(n)),
        }
    }
}
