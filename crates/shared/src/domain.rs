use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(MessageId);
id_newtype!(MediaKey);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Seen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
}

/// The other participant of a one-to-one conversation as the client renders
/// it. Online/last-seen are server-owned; the client never mutates them
/// locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    pub id: UserId,
    pub username: String,
    pub avatar: Option<MediaKey>,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// The logged-in user's own account record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<MediaKey>,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn as_peer(&self) -> Peer {
        Peer {
            id: self.id.clone(),
            username: self.username.clone(),
            avatar: self.avatar.clone(),
            online: self.online,
            last_seen: self.last_seen,
        }
    }
}

const PROVISIONAL_ID_PREFIX: &str = "local-";

/// One entry of a conversation timeline. The id is provisional (client
/// assigned) until the server acknowledges the send, after which it may
/// change exactly once; the conversation store splices rather than
/// duplicating on that transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: Option<String>,
    pub media_key: Option<MediaKey>,
    pub media_kind: Option<MediaKind>,
    pub created_at: DateTime<Utc>,
    pub status: Option<DeliveryStatus>,
    pub is_read: bool,
}

impl Message {
    pub fn provisional(
        sender_id: UserId,
        receiver_id: UserId,
        content: Option<String>,
        media_kind: Option<MediaKind>,
    ) -> Self {
        Self {
            id: MessageId(format!("{PROVISIONAL_ID_PREFIX}{}", Uuid::new_v4())),
            sender_id,
            receiver_id,
            content,
            media_key: None,
            media_kind,
            created_at: Utc::now(),
            status: None,
            is_read: false,
        }
    }

    pub fn is_provisional(&self) -> bool {
        self.id.0.starts_with(PROVISIONAL_ID_PREFIX)
    }
}

/// A historical message surfaced by search, with both participants
/// denormalized so the result list can render without extra lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: MessageId,
    pub message: String,
    pub sender: Peer,
    pub receiver: Peer,
}
