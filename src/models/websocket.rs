use serde::{ Serialize, Deserialize };
use super::chat::{ Author, Message };

pub const FAILURE_NOTICE_TEXT: &str = "Sorry, something went wrong!";

/// Events a client may emit. Frames look like `{"event": "sendMessage", "data": "..."}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "sendMessage")] SendMessage(String),
}

/// A one-off message for a single connection. Never persisted or broadcast.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub user: Author,
    pub text: String,
}

impl Notice {
    pub fn failure() -> Self {
        Self {
            user: Author::Ai,
            text: FAILURE_NOTICE_TEXT.to_string(),
        }
    }
}

/// Payload of a `message` event: either a stored message or a notice.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum MessagePayload {
    Stored(Message),
    Notice(Notice),
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "messageHistory")] MessageHistory(Vec<Message>),
    #[serde(rename = "message")] Message(MessagePayload),
    #[serde(rename = "error")] Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn stored(message: Message) -> Self {
        ServerEvent::Message(MessagePayload::Stored(message))
    }

    pub fn notice(notice: Notice) -> Self {
        ServerEvent::Message(MessagePayload::Notice(notice))
    }
}
