use async_trait::async_trait;
use crate::models::chat::Message;
use crate::store::{ MessageStore, StoreError };
use log::error;
use redis::{ Client, AsyncCommands };

/// Messages live in one sorted set scored by timestamp (ms). Each member is
/// prefixed with a zero-padded sequence number so equal scores fall back to
/// insertion order.
pub struct RedisMessageStore {
    client: Client,
    messages_key: String,
    seq_key: String,
}

impl RedisMessageStore {
    pub fn new(host: &str, key_prefix: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(host)?,
            messages_key: format!("{}messages", key_prefix),
            seq_key: format!("{}seq", key_prefix),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    async fn range(&self, start: isize, stop: isize) -> Result<Vec<Message>, StoreError> {
        let mut conn = self.get_connection().await?;
        let members: Vec<String> = conn.zrange(&self.messages_key, start, stop).await?;
        let mut messages = Vec::with_capacity(members.len());

        for member in &members {
            match decode_member(member) {
                Ok(msg) => messages.push(msg),
                Err(e) => error!("Error parsing stored message: {}", e),
            }
        }
        Ok(messages)
    }
}

pub(crate) fn encode_member(seq: u64, message: &Message) -> Result<String, StoreError> {
    Ok(format!("{:020}:{}", seq, serde_json::to_string(message)?))
}

pub(crate) fn decode_member(member: &str) -> Result<Message, StoreError> {
    let (_, json) = member
        .split_once(':')
        .ok_or_else(|| StoreError::Corrupt(format!("missing sequence prefix in '{}'", member)))?;
    Ok(serde_json::from_str(json)?)
}

#[async_trait]
impl MessageStore for RedisMessageStore {
    async fn insert(&self, message: Message) -> Result<Message, StoreError> {
        let mut conn = self.get_connection().await?;
        let seq: u64 = conn.incr(&self.seq_key, 1).await?;
        let member = encode_member(seq, &message)?;
        let score = message.timestamp().timestamp_millis() as f64;

        let _: i64 = conn.zadd(&self.messages_key, member, score).await?;
        Ok(message)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Message>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let window = isize::try_from(limit).unwrap_or(isize::MAX);
        self.range(-window, -1).await
    }

    async fn list_all(&self) -> Result<Vec<Message>, StoreError> {
        self.range(0, -1).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(StoreError::Unavailable(format!("unexpected PING reply '{}'", pong)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Author;
    use chrono::{ Duration, TimeZone, Utc };

    /// Orders members the way ZRANGE does: by score, then by member bytes.
    fn zrange_order(rows: &mut [(f64, String)]) {
        rows.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    }

    #[test]
    fn same_millisecond_race_still_lists_ascending() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let first = Message::with_timestamp(Author::User, "first", base + Duration::microseconds(100));
        let second = Message::with_timestamp(Author::User, "second", base + Duration::microseconds(600));

        // the later message won the INCR race
        let mut rows = vec![
            (first.timestamp().timestamp_millis() as f64, encode_member(2, &first).unwrap()),
            (second.timestamp().timestamp_millis() as f64, encode_member(1, &second).unwrap()),
        ];
        zrange_order(&mut rows);

        let listed: Vec<Message> = rows
            .iter()
            .map(|(_, member)| decode_member(member).unwrap())
            .collect();
        assert!(listed.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
    }

    #[test]
    fn score_round_trips_the_message_timestamp() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let msg = Message::with_timestamp(Author::Ai, "x", base + Duration::microseconds(1_999));
        let score = msg.timestamp().timestamp_millis();

        assert_eq!(Utc.timestamp_millis_opt(score).unwrap(), msg.timestamp());
    }

    #[test]
    fn members_sort_by_sequence_when_scores_tie() {
        let msg = Message::new(Author::User, "x");
        let mut members = vec![
            encode_member(10, &msg).unwrap(),
            encode_member(9, &msg).unwrap(),
            encode_member(100, &msg).unwrap(),
        ];
        members.sort();

        assert!(members[0].starts_with("00000000000000000009:"));
        assert!(members[1].starts_with("00000000000000000010:"));
        assert!(members[2].starts_with("00000000000000000100:"));
    }

    #[test]
    fn decodes_text_containing_colons() {
        let msg = Message::new(Author::Ai, "time: 12:30");
        let member = encode_member(1, &msg).unwrap();
        assert_eq!(decode_member(&member).unwrap(), msg);
    }

    #[test]
    fn rejects_member_without_prefix() {
        assert!(matches!(decode_member("garbage"), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn keys_use_the_configured_prefix() {
        let store = RedisMessageStore::new("redis://127.0.0.1:6379", "test:").unwrap();
        assert_eq!(store.messages_key, "test:messages");
        assert_eq!(store.seq_key, "test:seq");
    }

    mod live {
        use super::*;
        use uuid::Uuid;

        async fn fresh_store() -> RedisMessageStore {
            let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
            let prefix = format!("gemini-relay-test:{}:", Uuid::new_v4());
            RedisMessageStore::new(&url, &prefix).unwrap()
        }

        async fn cleanup(store: &RedisMessageStore) {
            let mut conn = store.get_connection().await.unwrap();
            let _: () = conn.del(&[&store.messages_key, &store.seq_key]).await.unwrap();
        }

        #[tokio::test]
        #[ignore = "needs a running Redis at REDIS_URL"]
        async fn recent_is_capped_and_ascending() {
            let store = fresh_store().await;
            let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            for i in (0..60).rev() {
                let msg = Message::with_timestamp(Author::User, i.to_string(), base + Duration::seconds(i));
                store.insert(msg).await.unwrap();
            }

            let recent = store.recent(50).await.unwrap();
            let unlimited = store.recent(usize::MAX).await.unwrap();
            cleanup(&store).await;

            assert_eq!(recent.len(), 50);
            assert_eq!(recent.first().unwrap().text(), "10");
            assert_eq!(recent.last().unwrap().text(), "59");
            assert!(recent.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
            assert_eq!(unlimited.len(), 60);
        }

        #[tokio::test]
        #[ignore = "needs a running Redis at REDIS_URL"]
        async fn list_all_returns_each_record_once() {
            let store = fresh_store().await;
            let mut ids = Vec::new();
            for text in ["Hello", "Hi! How can I help?", "Hello"] {
                ids.push(store.insert(Message::new(Author::User, text)).await.unwrap().id());
            }

            let listed = store.list_all().await.unwrap();
            cleanup(&store).await;

            let listed_ids: Vec<Uuid> = listed.iter().map(|m| m.id()).collect();
            assert_eq!(listed_ids, ids);
        }

        #[tokio::test]
        #[ignore = "needs a running Redis at REDIS_URL"]
        async fn equal_timestamps_keep_insertion_order() {
            let store = fresh_store().await;
            let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            for text in ["c", "a", "b"] {
                store.insert(Message::with_timestamp(Author::User, text, ts)).await.unwrap();
            }

            let texts: Vec<String> = store
                .list_all().await
                .unwrap()
                .iter()
                .map(|m| m.text().to_string())
                .collect();
            cleanup(&store).await;

            assert_eq!(texts, vec!["c", "a", "b"]);
        }
    }
}
