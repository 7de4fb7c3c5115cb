use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
};

use futures::future::join_all;
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

use chat_provider::{
    ChannelHandle, ChatConnector, ChatEvent, ChatSession, FetchDirection, ProviderMessage,
};
use shared::domain::ChannelSid;
use storage::{CachedMessage, InsertOutcome, MessageCache};

pub mod credentials;
pub mod media;
pub mod types;

pub use credentials::{CredentialError, CredentialSource, HttpCredentialSource};
pub use media::{HttpMediaFetcher, MediaFetcher};
pub use types::{RoomMessage, RoomView, StoreAction};

/// Catch-up size used when a channel has no cached history yet.
const INITIAL_FETCH_LIMIT: i64 = 100;

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("credential fetch failed: {0}")]
    Credentials(#[from] CredentialError),
    #[error("failed to open provider session: {0}")]
    Connect(String),
}

/// Failures of the outbound operations. These are always returned as values;
/// nothing in the engine panics or raises past this type.
#[derive(Debug, Error)]
pub enum OutboundError {
    #[error("channel {0} is not joined")]
    ChannelNotJoined(ChannelSid),
    #[error("provider call failed: {0}")]
    Provider(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("cache write failed: {0}")]
    Cache(#[source] anyhow::Error),
    #[error("media download failed: {0}")]
    Media(#[source] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Ingested,
    /// The cache already held (channel, index); no store dispatch happened.
    Duplicate,
}

/// Synchronizes provider channel/message state into the local cache and the
/// reactive store.
///
/// All work is driven by provider events consumed on a single task; the only
/// intra-operation concurrency is the explicit fan-out/fan-in of cache writes
/// and media downloads during ingestion.
pub struct ChatSyncEngine {
    credentials: Arc<dyn CredentialSource>,
    connector: Arc<dyn ChatConnector>,
    media: Arc<dyn MediaFetcher>,
    cache: MessageCache,
    media_root: PathBuf,
    inner: Mutex<EngineState>,
    store: broadcast::Sender<StoreAction>,
}

struct EngineState {
    session: Option<Arc<dyn ChatSession>>,
    channels: HashMap<ChannelSid, Arc<dyn ChannelHandle>>,
    event_task: Option<JoinHandle<()>>,
}

impl ChatSyncEngine {
    pub fn new(
        credentials: Arc<dyn CredentialSource>,
        connector: Arc<dyn ChatConnector>,
        media: Arc<dyn MediaFetcher>,
        cache: MessageCache,
        media_root: impl Into<PathBuf>,
    ) -> Arc<Self> {
        let (store, _) = broadcast::channel(1024);
        Arc::new(Self {
            credentials,
            connector,
            media,
            cache,
            media_root: media_root.into(),
            inner: Mutex::new(EngineState {
                session: None,
                channels: HashMap::new(),
                event_task: None,
            }),
            store,
        })
    }

    /// Store updates for UI consumption. Subscribe before `login` to observe
    /// the initial `SetCurrentUser` dispatch.
    pub fn subscribe_store(&self) -> broadcast::Receiver<StoreAction> {
        self.store.subscribe()
    }

    /// Opens the provider session and starts consuming its events.
    pub async fn login(self: &Arc<Self>) -> Result<(), LoginError> {
        let token = self.credentials.fetch_token().await?;
        let session = self
            .connector
            .connect(&token)
            .await
            .map_err(|err| LoginError::Connect(err.to_string()))?;

        let _ = self
            .store
            .send(StoreAction::SetCurrentUser(session.identity()));

        let mut events = session.subscribe_events();
        let engine = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                engine.handle_event(event).await;
            }
        });

        let previous = {
            let mut guard = self.inner.lock().await;
            guard.session = Some(session);
            guard.channels.clear();
            guard.event_task.replace(task)
        };
        if let Some(previous) = previous {
            previous.abort();
        }

        Ok(())
    }

    /// Tears the session down; joined channel handles do not survive logout.
    pub async fn logout(&self) {
        let mut guard = self.inner.lock().await;
        guard.session = None;
        guard.channels.clear();
        if let Some(task) = guard.event_task.take() {
            task.abort();
        }
    }

    async fn handle_event(self: &Arc<Self>, event: ChatEvent) {
        match event {
            ChatEvent::TokenAboutToExpire => {
                if let Err(err) = self.refresh_credentials().await {
                    warn!(%err, "credential refresh before expiry failed");
                }
            }
            ChatEvent::TokenExpired => {
                if let Err(err) = self.refresh_credentials().await {
                    warn!(%err, "credential refresh after expiry failed");
                    return;
                }
                // The transport may have dropped messages while the
                // credential was stale; re-run catch-up for every channel.
                self.resync_all_channels().await;
            }
            ChatEvent::ChannelJoined(handle) => {
                let channel_sid = handle.sid();
                if let Err(err) = self.handle_channel_joined(handle).await {
                    warn!(channel_sid = %channel_sid, %err, "channel join reconciliation failed");
                }
            }
            ChatEvent::ChannelLeft { channel_sid } => {
                self.inner.lock().await.channels.remove(&channel_sid);
                let _ = self.store.send(StoreAction::RemoveRoom {
                    room_sid: channel_sid,
                });
            }
            ChatEvent::MessageAdded(message) => match self.ingest_message(&message).await {
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        channel_sid = %message.channel_sid,
                        message_sid = %message.sid,
                        %err,
                        "message ingestion failed"
                    );
                }
            },
        }
    }

    async fn refresh_credentials(&self) -> anyhow::Result<()> {
        let session = self
            .inner
            .lock()
            .await
            .session
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no active session"))?;
        let token = self
            .credentials
            .fetch_token()
            .await
            .map_err(anyhow::Error::from)?;
        session.update_token(&token).await?;
        info!("provider credential rotated in place");
        Ok(())
    }

    /// Channel join reconciliation: cache read, room projection, handle
    /// registration, then catch-up fetch and fan-out ingestion.
    async fn handle_channel_joined(
        self: &Arc<Self>,
        handle: Arc<dyn ChannelHandle>,
    ) -> anyhow::Result<()> {
        let channel_sid = handle.sid();
        let cached = self.cache.messages_for_channel(&channel_sid).await?;
        let last_saved_index = cached.last().map(|m| m.message_index);
        let last_provider_index = handle.last_message_index().unwrap_or(0);

        let messages: Vec<RoomMessage> = cached
            .iter()
            .map(|m| RoomMessage::from_cached(m, &self.media_root))
            .collect();

        let _ = self.store.send(StoreAction::AddRoom(RoomView {
            sid: channel_sid.clone(),
            name: handle.friendly_name(),
            attributes: handle.attributes(),
            last_consumed_index: handle.last_consumed_message_index(),
            messages,
        }));

        self.inner
            .lock()
            .await
            .channels
            .insert(channel_sid.clone(), Arc::clone(&handle));

        let catch_up_count = if cached.is_empty() {
            INITIAL_FETCH_LIMIT
        } else {
            last_provider_index - last_saved_index.unwrap_or(0)
        };
        // Zero or negative means the cache is already up to date.
        if catch_up_count > 0 {
            let fetched = handle
                .get_messages(catch_up_count as u32, None, FetchDirection::Backward)
                .await?;
            self.ingest_batch(&fetched).await;
        }

        let _ = self.store.send(StoreAction::RoomLoaded);
        Ok(())
    }

    async fn ingest_batch(self: &Arc<Self>, messages: &[ProviderMessage]) {
        let results = join_all(messages.iter().map(|m| self.ingest_message(m))).await;
        for (message, result) in messages.iter().zip(results) {
            if let Err(err) = result {
                warn!(
                    channel_sid = %message.channel_sid,
                    message_sid = %message.sid,
                    %err,
                    "catch-up ingestion failed"
                );
            }
        }
    }

    /// Re-runs catch-up for every registered channel after a forced
    /// credential rotation.
    async fn resync_all_channels(self: &Arc<Self>) {
        let handles: Vec<Arc<dyn ChannelHandle>> = {
            let guard = self.inner.lock().await;
            guard.channels.values().cloned().collect()
        };
        for handle in handles {
            let channel_sid = handle.sid();
            if let Err(err) = self.resync_channel(handle).await {
                warn!(channel_sid = %channel_sid, %err, "post-expiry resync failed");
            }
        }
    }

    async fn resync_channel(self: &Arc<Self>, handle: Arc<dyn ChannelHandle>) -> anyhow::Result<()> {
        let channel_sid = handle.sid();
        let last_saved_index = self.cache.last_saved_index(&channel_sid).await?;
        let last_provider_index = handle.last_message_index().unwrap_or(0);

        let catch_up_count = match last_saved_index {
            None => INITIAL_FETCH_LIMIT,
            Some(saved) => last_provider_index - saved,
        };
        if catch_up_count <= 0 {
            return Ok(());
        }

        let fetched = handle
            .get_messages(catch_up_count as u32, None, FetchDirection::Backward)
            .await?;
        self.ingest_batch(&fetched).await;
        Ok(())
    }

    /// Applies to both live `MessageAdded` events and catch-up fetches.
    ///
    /// Idempotent in effect: the cache's uniqueness constraint rejects the
    /// second write of (channel, index), reported as `Duplicate`, and no
    /// append is dispatched for it.
    pub async fn ingest_message(
        &self,
        message: &ProviderMessage,
    ) -> Result<IngestOutcome, IngestError> {
        let image_name = message
            .media
            .as_ref()
            .map(|media| derive_image_name(message, &media.content_type));

        let record = CachedMessage {
            sid: message.sid.clone(),
            channel_sid: message.channel_sid.clone(),
            message_index: message.index,
            body: message.body.clone(),
            author: message.author.clone(),
            sent_at: message.sent_at,
            image_name: image_name.clone(),
            meta: message.attributes.clone(),
        };

        let save = self.cache.insert_message(&record);
        let download = async {
            match (&image_name, &message.media) {
                (Some(name), Some(media)) => {
                    self.media
                        .download(&media.content_url, &self.media_root.join(name))
                        .await
                }
                _ => Ok(()),
            }
        };
        let (saved, downloaded) = tokio::join!(save, download);

        let outcome = saved.map_err(IngestError::Cache)?;
        if outcome == InsertOutcome::AlreadyExists {
            return Ok(IngestOutcome::Duplicate);
        }
        downloaded.map_err(IngestError::Media)?;

        let _ = self.store.send(StoreAction::AppendMessage {
            room_sid: message.channel_sid.clone(),
            message: RoomMessage::from_provider(message, image_name.as_deref(), &self.media_root),
        });
        Ok(IngestOutcome::Ingested)
    }

    /// Sends a message on a joined channel, attaching the local user's
    /// display name as metadata.
    pub async fn send_message(
        &self,
        channel_sid: &ChannelSid,
        body: &str,
    ) -> Result<(), OutboundError> {
        let (handle, session) = {
            let guard = self.inner.lock().await;
            let handle = guard
                .channels
                .get(channel_sid)
                .cloned()
                .ok_or_else(|| OutboundError::ChannelNotJoined(channel_sid.clone()))?;
            (handle, guard.session.clone())
        };

        let display_name = session
            .as_ref()
            .and_then(|s| s.friendly_name())
            .or_else(|| session.map(|s| s.identity().0));
        let attributes = match display_name {
            Some(name) => serde_json::json!({ "friendlyName": name }),
            None => serde_json::json!({}),
        };

        handle
            .send_message(body, attributes)
            .await
            .map_err(|err| OutboundError::Provider(err.to_string()))
    }

    /// Marks everything up to `message_index` as read and publishes the new
    /// consumed watermark.
    pub async fn mark_all_consumed(
        &self,
        channel_sid: &ChannelSid,
        message_index: i64,
    ) -> Result<(), OutboundError> {
        let handle = self
            .inner
            .lock()
            .await
            .channels
            .get(channel_sid)
            .cloned()
            .ok_or_else(|| OutboundError::ChannelNotJoined(channel_sid.clone()))?;

        handle
            .set_all_messages_consumed()
            .await
            .map_err(|err| OutboundError::Provider(err.to_string()))?;

        let _ = self.store.send(StoreAction::ConsumedIndexUpdated {
            room_sid: channel_sid.clone(),
            index: message_index,
        });
        Ok(())
    }

    /// Fetches exactly one message at the given sequence index and ingests it.
    pub async fn fetch_single_message(
        &self,
        channel_sid: &ChannelSid,
        message_index: i64,
    ) -> Result<(), OutboundError> {
        let handle = self
            .inner
            .lock()
            .await
            .channels
            .get(channel_sid)
            .cloned()
            .ok_or_else(|| OutboundError::ChannelNotJoined(channel_sid.clone()))?;

        let messages = handle
            .get_messages(1, Some(message_index), FetchDirection::Forward)
            .await
            .map_err(|err| OutboundError::Provider(err.to_string()))?;

        for message in &messages {
            if let Err(err) = self.ingest_message(message).await {
                warn!(
                    channel_sid = %message.channel_sid,
                    message_sid = %message.sid,
                    %err,
                    "single-message ingestion failed"
                );
            }
        }
        Ok(())
    }
}

fn derive_image_name(message: &ProviderMessage, content_type: &str) -> String {
    let subtype = content_type.split('/').nth(1).unwrap_or("bin");
    format!("{}.{subtype}", message.sid)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
