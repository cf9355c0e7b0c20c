use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::conversation::{self, Channel};
use crate::entities::message;

/// Events a connected client may send. Channel identifiers arrive as raw
/// strings and are validated against the fixed channel set on dispatch, so a
/// bad channel yields a targeted error instead of a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Subscribe to a conversation room. Admins pass `userId` to pick whose
    /// conversation; joining as admin also marks it read.
    #[serde(rename_all = "camelCase")]
    JoinChannel {
        channel: String,
        user_id: Option<Uuid>,
    },
    /// Append a message to the sender's own conversation.
    #[serde(rename_all = "camelCase")]
    SendMessage {
        channel: String,
        content: String,
        client_ref: Option<String>,
    },
    /// Drop the subscription created by `join-channel`.
    #[serde(rename_all = "camelCase")]
    LeaveChannel {
        channel: String,
        user_id: Option<Uuid>,
    },
    /// Append a reply into a customer's conversation. Admin only.
    #[serde(rename_all = "camelCase")]
    SendAdminMessage {
        user_id: Uuid,
        channel: String,
        content: String,
        client_ref: Option<String>,
    },
    /// Zero the caller's unread counter for a conversation.
    #[serde(rename_all = "camelCase")]
    MarkRead {
        channel: String,
        user_id: Option<Uuid>,
    },
    #[serde(rename_all = "camelCase")]
    Typing {
        channel: String,
        user_id: Option<Uuid>,
    },
    #[serde(rename_all = "camelCase")]
    StopTyping {
        channel: String,
        user_id: Option<Uuid>,
    },
}

/// Events the server pushes to clients. The variant carrying a `client_ref`
/// echoes the reference from the originating `send-message`, letting the
/// sender match the authoritative broadcast against its optimistic copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Join acknowledgement with the conversation snapshot and history.
    #[serde(rename_all = "camelCase")]
    JoinedChannel {
        channel: Channel,
        conversation: conversation::Model,
        messages: Vec<message::Model>,
    },
    /// Authoritative copy of an appended message, broadcast to the room.
    #[serde(rename_all = "camelCase")]
    NewMessage {
        message: message::Model,
        conversation: conversation::Model,
        client_ref: Option<String>,
    },
    /// Customer activity notification for the admin inbox.
    #[serde(rename_all = "camelCase")]
    NewUserMessage {
        message: message::Model,
        conversation: conversation::Model,
    },
    /// Admin reply notification, fanned out to the other admins.
    #[serde(rename_all = "camelCase")]
    NewAdminMessage {
        message: message::Model,
        conversation: conversation::Model,
    },
    /// Unread counters changed (append or mark-as-read).
    #[serde(rename_all = "camelCase")]
    UnreadUpdated { conversation: conversation::Model },
    #[serde(rename_all = "camelCase")]
    Typing {
        channel: Channel,
        user_id: Uuid,
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    StopTyping { channel: Channel, user_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Error {
        kind: String,
        message: String,
        client_ref: Option<String>,
    },
}
