use async_trait::async_trait;
use tokio::sync::RwLock;
use crate::models::chat::Message;
use crate::store::{ sort_by_timestamp, MessageStore, StoreError };

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: RwLock<Vec<Message>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.messages.read().await.len()
    }

    async fn sorted(&self) -> Vec<Message> {
        let mut messages = self.messages.read().await.clone();
        sort_by_timestamp(&mut messages);
        messages
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn insert(&self, message: Message) -> Result<Message, StoreError> {
        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Message>, StoreError> {
        let mut messages = self.sorted().await;
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.split_off(skip))
    }

    async fn list_all(&self) -> Result<Vec<Message>, StoreError> {
        Ok(self.sorted().await)
    }
}
