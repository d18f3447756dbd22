use crate::llm::chat::ChatClient;
use crate::models::chat::{ Author, Message };
use crate::models::websocket::{ ClientEvent, Notice, ServerEvent };
use crate::store::{ MessageStore, StoreError };

use log::{ info, warn, error, debug };
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error as ThisError;
use tokio::sync::{ broadcast, RwLock };
use uuid::Uuid;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, ThisError)]
pub enum RelayError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("completion service error: {0}")]
    Completion(String),
}

/// What a freshly registered connection needs to get going.
pub struct Connection {
    pub id: Uuid,
    pub history: Vec<Message>,
    pub updates: broadcast::Receiver<Message>,
}

/// Shared state behind both servers: the store, the completion client and
/// the set of live connections. Built once at startup and passed around in
/// an `Arc`.
pub struct RelayCoordinator {
    store: Arc<dyn MessageStore>,
    chat_client: Arc<dyn ChatClient>,
    hub: broadcast::Sender<Message>,
    connections: RwLock<HashMap<Uuid, SocketAddr>>,
    history_limit: usize,
}

impl RelayCoordinator {
    pub fn new(
        store: Arc<dyn MessageStore>,
        chat_client: Arc<dyn ChatClient>,
        history_limit: usize
    ) -> Self {
        let (hub, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            store,
            chat_client,
            hub,
            connections: RwLock::new(HashMap::new()),
            history_limit,
        }
    }

    /// Registers a connection and loads the history it should be sent.
    ///
    /// The broadcast subscription is taken before the history read, so a
    /// message stored in between may show up twice but is never missed.
    pub async fn connect(&self, peer: SocketAddr) -> Connection {
        let id = Uuid::new_v4();
        let updates = self.hub.subscribe();
        self.connections.write().await.insert(id, peer);
        info!("User connected: {} ({})", id, peer);

        let history = self.recent_history().await;
        Connection { id, history, updates }
    }

    pub async fn disconnect(&self, id: Uuid) {
        if let Some(peer) = self.connections.write().await.remove(&id) {
            info!("User disconnected: {} ({})", id, peer);
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Most recent messages, oldest first. A failed read yields an empty history.
    pub async fn recent_history(&self) -> Vec<Message> {
        match self.store.recent(self.history_limit).await {
            Ok(messages) => messages,
            Err(e) => {
                error!("Failed to load message history: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn list_messages(&self) -> Result<Vec<Message>, StoreError> {
        self.store.list_all().await
    }

    /// Runs one client event. The returned event, if any, goes to the origin
    /// connection only.
    pub async fn dispatch(&self, origin: Uuid, event: ClientEvent) -> Option<ServerEvent> {
        match event {
            ClientEvent::SendMessage(text) => {
                match self.handle_send_message(text).await {
                    Ok(reply) => {
                        debug!("AI reply {} stored for {}", reply.id(), origin);
                        None
                    }
                    Err(e) => {
                        error!("AI or DB error for {}: {}", origin, e);
                        Some(ServerEvent::notice(Notice::failure()))
                    }
                }
            }
        }
    }

    /// Persist and broadcast the user's text, ask the model, then persist and
    /// broadcast its reply. Returns the stored reply.
    pub async fn handle_send_message(&self, text: String) -> Result<Message, RelayError> {
        let user_message = self.store.insert(Message::new(Author::User, text)).await?;
        self.broadcast(&user_message);

        let completion = self.chat_client
            .complete(user_message.text()).await
            .map_err(|e| RelayError::Completion(e.to_string()))?;
        if completion.response.trim().is_empty() {
            return Err(RelayError::Completion("model returned an empty reply".into()));
        }

        let ai_message = self.store.insert(Message::new(Author::Ai, completion.response)).await?;
        self.broadcast(&ai_message);

        Ok(ai_message)
    }

    fn broadcast(&self, message: &Message) {
        if let Err(e) = self.hub.send(message.clone()) {
            warn!("No connected clients to receive message {}: {}", message.id(), e);
        }
    }
}
