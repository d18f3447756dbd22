use chrono::{ DateTime, SubsecRound, Utc };
use serde::{ Serialize, Deserialize };
use uuid::Uuid;

/// Who wrote a message. Serialized as `"User"` / `"AI"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Author {
    User,
    #[serde(rename = "AI")]
    Ai,
}

/// A chat message as persisted and relayed.
///
/// Fields are private: a message is fixed at construction and there is no way
/// to change it afterwards. The timestamp is the only ordering key and is
/// kept at millisecond precision, the resolution the store scores by.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: Uuid,
    #[serde(rename = "user")]
    author: Author,
    text: String,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a message stamped with the current time.
    pub fn new(author: Author, text: impl Into<String>) -> Self {
        Self::with_timestamp(author, text, Utc::now())
    }

    pub fn with_timestamp(author: Author, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author,
            text: text.into(),
            timestamp: timestamp.trunc_subsecs(3),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn author(&self) -> Author {
        self.author
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
