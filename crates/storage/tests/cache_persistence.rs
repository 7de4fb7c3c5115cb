use chrono::Utc;
use shared::domain::{ChannelSid, MessageSid, UserIdentity};
use storage::{CachedMessage, InsertOutcome, MessageCache};

#[tokio::test]
async fn cache_survives_reopen_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = format!("sqlite://{}/cache.db", dir.path().display());

    {
        let cache = MessageCache::new(&database_url).await.expect("db");
        let outcome = cache
            .insert_message(&CachedMessage {
                sid: MessageSid("M1".into()),
                channel_sid: ChannelSid("C1".into()),
                message_index: 1,
                body: "hello".into(),
                author: UserIdentity("alice".into()),
                sent_at: Utc::now(),
                image_name: None,
                meta: serde_json::json!({}),
            })
            .await
            .expect("insert");
        assert_eq!(outcome, InsertOutcome::Inserted);
    }

    let reopened = MessageCache::new(&database_url).await.expect("reopen");
    reopened.health_check().await.expect("ping");
    let rows = reopened
        .messages_for_channel(&ChannelSid("C1".into()))
        .await
        .expect("query");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].sid, MessageSid("M1".into()));
}
