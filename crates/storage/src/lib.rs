use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{fs, path::Path, str::FromStr};

use shared::domain::{ChannelSid, MessageSid, UserIdentity};

/// Local cache of provider messages, keyed by (channel sid, sequence index).
///
/// Duplicate ingestion is the expected failure mode here: the unique
/// constraint is the only thing preventing double writes when a catch-up
/// fetch races a live event for the same message. `insert_message` reports
/// that case as a typed outcome instead of an error.
#[derive(Clone)]
pub struct MessageCache {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMessage {
    pub sid: MessageSid,
    pub channel_sid: ChannelSid,
    pub message_index: i64,
    pub body: String,
    pub author: UserIdentity,
    pub sent_at: DateTime<Utc>,
    pub image_name: Option<String>,
    pub meta: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

impl MessageCache {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // A memory database is private to its connection; a larger pool would
        // hand out connections that cannot see each other's writes.
        let max_connections = if database_url.ends_with(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn insert_message(&self, message: &CachedMessage) -> Result<InsertOutcome> {
        let result = sqlx::query(
            "INSERT INTO messages (sid, channel_sid, message_index, body, author, sent_at, image_name, meta)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(message.sid.as_str())
        .bind(message.channel_sid.as_str())
        .bind(message.message_index)
        .bind(&message.body)
        .bind(message.author.as_str())
        .bind(message.sent_at)
        .bind(message.image_name.as_deref())
        .bind(message.meta.to_string())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Ok(InsertOutcome::AlreadyExists)
            }
            Err(err) => Err(err).context("failed to insert cached message"),
        }
    }

    /// All cached messages for a channel, oldest first.
    pub async fn messages_for_channel(&self, channel_sid: &ChannelSid) -> Result<Vec<CachedMessage>> {
        let rows = sqlx::query(
            "SELECT sid, channel_sid, message_index, body, author, sent_at, image_name, meta
             FROM messages
             WHERE channel_sid = ?
             ORDER BY message_index ASC",
        )
        .bind(channel_sid.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let meta_raw: String = r.get("meta");
                let meta = serde_json::from_str(&meta_raw)
                    .with_context(|| format!("invalid meta json: {meta_raw}"))?;
                Ok(CachedMessage {
                    sid: MessageSid(r.get::<String, _>("sid")),
                    channel_sid: ChannelSid(r.get::<String, _>("channel_sid")),
                    message_index: r.get::<i64, _>("message_index"),
                    body: r.get::<String, _>("body"),
                    author: UserIdentity(r.get::<String, _>("author")),
                    sent_at: r.get::<DateTime<Utc>, _>("sent_at"),
                    image_name: r.get::<Option<String>, _>("image_name"),
                    meta,
                })
            })
            .collect()
    }

    /// Sequence index of the most recently cached message for a channel.
    pub async fn last_saved_index(&self, channel_sid: &ChannelSid) -> Result<Option<i64>> {
        let index: Option<i64> =
            sqlx::query_scalar("SELECT MAX(message_index) FROM messages WHERE channel_sid = ?")
                .bind(channel_sid.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(index)
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return Ok(());
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if path.is_empty() {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!(
                    "failed to create parent directory '{}' for database url '{database_url}'",
                    parent.display()
                )
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
