//! JSON frames exchanged with the protocol sidecar over WebSocket.
//!
//! Every frame is an object with a `type` tag. Requests that expect an answer
//! carry a `request_id` echoed back in the matching [`SidecarFrame::Ack`] or
//! media frames.

use serde::{Deserialize, Serialize};

use crate::message::{MessageKey, OutgoingContent, SendOptions, WebMessage};

/// zenor → sidecar.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayFrame {
    /// Open the chat connection. `credentials` is the stored credential blob,
    /// absent when pairing.
    Connect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials: Option<String>,
        pairing: bool,
        browser: Vec<String>,
    },
    SendMessage {
        request_id: String,
        jid: String,
        content: OutgoingContent,
        #[serde(default)]
        options: SendOptions,
    },
    ReadMessages {
        request_id: String,
        keys: Vec<MessageKey>,
    },
    /// Stream the media of `message` back as [`SidecarFrame::MediaChunk`]s.
    DownloadMedia {
        request_id: String,
        message: WebMessage,
    },
    Logout,
}

impl std::fmt::Debug for GatewayFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect { pairing, .. } => f
                .debug_struct("Connect")
                .field("credentials", &"[REDACTED]")
                .field("pairing", pairing)
                .finish_non_exhaustive(),
            Self::SendMessage {
                request_id, jid, ..
            } => f
                .debug_struct("SendMessage")
                .field("request_id", request_id)
                .field("jid", jid)
                .finish_non_exhaustive(),
            Self::ReadMessages { request_id, keys } => f
                .debug_struct("ReadMessages")
                .field("request_id", request_id)
                .field("keys", &keys.len())
                .finish(),
            Self::DownloadMedia { request_id, .. } => f
                .debug_struct("DownloadMedia")
                .field("request_id", request_id)
                .finish_non_exhaustive(),
            Self::Logout => f.write_str("Logout"),
        }
    }
}

/// sidecar → zenor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarFrame {
    /// A client event, named as in [`crate::EventKind::as_str`].
    Event {
        event: String,
        #[serde(default)]
        data: serde_json::Value,
    },
    Ack {
        request_id: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Base64-encoded media bytes.
    MediaChunk { request_id: String, data: String },
    MediaEnd { request_id: String },
    MediaError { request_id: String, error: String },
    Error { error: String },
}
