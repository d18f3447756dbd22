pub mod memory;
pub mod redis;

use async_trait::async_trait;
use log::{ info, error };
use std::error::Error;
use std::sync::Arc;
use thiserror::Error as ThisError;
use crate::cli::Args;
use crate::models::chat::Message;

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("failed to encode or decode message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed record in store: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Append-only message log ordered by timestamp, ties kept in insertion order.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Appends a message and returns it as stored.
    async fn insert(&self, message: Message) -> Result<Message, StoreError>;

    /// The `limit` most recent messages, oldest first.
    async fn recent(&self, limit: usize) -> Result<Vec<Message>, StoreError>;

    /// Every message, oldest first.
    async fn list_all(&self) -> Result<Vec<Message>, StoreError>;

    /// Round-trip check used at startup.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub fn create_message_store(
    args: &Args
) -> Result<Arc<dyn MessageStore>, Box<dyn Error + Send + Sync>> {
    match args.store_type.to_lowercase().as_str() {
        "redis" => {
            let store = redis::RedisMessageStore::new(&args.store_host, &args.store_redis_prefix)?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(memory::MemoryMessageStore::new())),
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported store type: {}", args.store_type)
                    )
                )
            ),
    }
}

/// Builds the store and pings it once. An unreachable store is logged and the
/// relay keeps running; every later call reconnects on its own.
pub async fn initialize_message_store(
    args: &Args
) -> Result<Arc<dyn MessageStore>, Box<dyn Error + Send + Sync>> {
    info!("Chat messages will be stored in: {} at {}", args.store_type, args.store_host);
    let store = create_message_store(args)?;
    match store.ping().await {
        Ok(()) => info!("Message store connected successfully"),
        Err(e) => error!("Message store connection error: {}. Continuing without a working store.", e),
    }
    Ok(store)
}

/// Stable sort by timestamp, so equal timestamps keep insertion order.
pub(crate) fn sort_by_timestamp(messages: &mut [Message]) {
    messages.sort_by_key(|m| m.timestamp());
}
