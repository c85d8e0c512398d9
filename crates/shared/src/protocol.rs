use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    DeliveryStatus, MediaKey, MediaKind, Message, MessageId, Peer, Profile, SearchHit, UserId,
};

// REST payloads. Field names follow the upstream API verbatim (camelCase,
// Mongo-style `_id`), so these types are the only place renames live.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub message: String,
    pub access_token: String,
    pub user: ApiUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUser {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<MediaKey>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl From<ApiUser> for Peer {
    fn from(user: ApiUser) -> Self {
        Peer {
            id: user.id,
            username: user.username,
            avatar: user.profile_pic,
            online: user.is_online,
            last_seen: user.last_seen,
        }
    }
}

impl From<ApiUser> for Profile {
    fn from(user: ApiUser) -> Self {
        Profile {
            id: user.id,
            username: user.username,
            email: user.email.unwrap_or_default(),
            phone: user.phone,
            description: user.description,
            avatar: user.profile_pic,
            online: user.is_online,
            last_seen: user.last_seen,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user: ApiUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryResponse {
    pub users: Vec<ApiUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_key: Option<MediaKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaKind>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeliveryStatus>,
}

impl From<ChatRecord> for Message {
    fn from(record: ChatRecord) -> Self {
        let is_read = record.status == Some(DeliveryStatus::Seen);
        Message {
            id: record.id,
            sender_id: record.sender_id,
            receiver_id: record.receiver_id,
            content: record.message,
            media_key: record.media_key,
            media_kind: record.media_type,
            created_at: record.created_at,
            status: record.status,
            is_read,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub chats: Vec<ChatRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResponse {
    pub chat: ChatRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMessageRecord {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub message: String,
    pub sender_id: ApiUser,
    pub receiver_id: ApiUser,
}

impl From<SearchMessageRecord> for SearchHit {
    fn from(record: SearchMessageRecord) -> Self {
        SearchHit {
            id: record.id,
            message: record.message,
            sender: record.sender_id.into(),
            receiver: record.receiver_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub users: Vec<ApiUser>,
    pub messages: Vec<SearchMessageRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedUrlResponse {
    pub url: String,
}

// Push-channel frames. The channel itself is authenticated by a token
// handshake parameter; frames carry no credentials.

/// Client-to-server notices sent over the push channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ClientNotice {
    /// "Viewing peer X": lets the server mark X's messages to us as seen.
    #[serde(rename_all = "camelCase")]
    MessageSeen { sender_id: UserId },
}

/// Server-to-client events delivered over the push channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum PushEvent {
    /// Seen receipt scoped to a receiver id.
    #[serde(rename_all = "camelCase")]
    MessagesSeen { receiver_id: UserId },
}
