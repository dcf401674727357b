//! The canonical message handed to handlers.

use std::sync::Arc;

use {
    bytes::{Bytes, BytesMut},
    futures::StreamExt,
    serde_json::Value,
    tokio::sync::OnceCell,
    tracing::debug,
};

use zenor_protocol::{MessageKey, OutgoingContent, SendOptions, WebMessage};

use crate::{content::Content, error::Result, transport::Socket};

/// How a quoted message was wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotedKind {
    Normal,
    Ephemeral,
    ViewOnce,
}

/// The message a canonical message replies to.
pub struct Quoted {
    pub kind: QuotedKind,
    pub stanza_id: Option<String>,
    pub sender_id: Option<String>,
    pub is_self: bool,
    pub content_type: String,
    pub body: String,
    /// Key addressing the quoted message in the same chat.
    pub key: MessageKey,
    /// Unwrapped quoted message object.
    pub message: Value,
    socket: Arc<dyn Socket>,
    media: OnceCell<Bytes>,
}

impl Quoted {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        kind: QuotedKind,
        stanza_id: Option<String>,
        sender_id: Option<String>,
        is_self: bool,
        content_type: String,
        body: String,
        key: MessageKey,
        message: Value,
        socket: Arc<dyn Socket>,
    ) -> Self {
        Self {
            kind,
            stanza_id,
            sender_id,
            is_self,
            content_type,
            body,
            key,
            message,
            socket,
            media: OnceCell::new(),
        }
    }

    /// Download the quoted media. Fetched once, then served from memory.
    pub async fn download(&self) -> Result<Bytes> {
        self.media
            .get_or_try_init(|| async {
                let target = WebMessage {
                    key: self.key.clone(),
                    message: Some(self.message.clone()),
                    ..Default::default()
                };
                collect_media(self.socket.as_ref(), &target).await
            })
            .await
            .cloned()
    }
}

impl std::fmt::Debug for Quoted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Quoted")
            .field("kind", &self.kind)
            .field("stanza_id", &self.stanza_id)
            .field("sender_id", &self.sender_id)
            .field("is_self", &self.is_self)
            .field("content_type", &self.content_type)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

/// A normalized inbound message. Built once per raw upsert and immutable
/// afterwards, except for the lazily downloaded media buffer.
pub struct CanonicalMessage {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub is_from_self: bool,
    pub is_group_chat: bool,
    pub content: Content,
    pub content_type: String,
    pub body: String,
    pub quoted: Option<Quoted>,
    pub mentioned_ids: Vec<String>,
    pub push_name: Option<String>,
    pub timestamp: Option<u64>,
    pub(crate) raw: WebMessage,
    pub(crate) socket: Arc<dyn Socket>,
    pub(crate) media: OnceCell<Bytes>,
}

impl CanonicalMessage {
    /// The raw message this was derived from.
    pub fn raw(&self) -> &WebMessage {
        &self.raw
    }

    pub fn key(&self) -> &MessageKey {
        &self.raw.key
    }

    pub fn socket(&self) -> &Arc<dyn Socket> {
        &self.socket
    }

    pub fn is_media(&self) -> bool {
        self.content.is_media()
    }

    /// Split `body` into a lowercase command name and its argument text when
    /// it starts with `prefix`.
    pub fn command(&self, prefix: &str) -> Option<(String, &str)> {
        let rest = self.body.strip_prefix(prefix)?.trim_start();
        let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        (!name.is_empty()).then(|| (name.to_lowercase(), args.trim()))
    }

    /// Download this message's media. Fetched once, then served from memory.
    pub async fn download(&self) -> Result<Bytes> {
        self.media
            .get_or_try_init(|| async {
                let target = WebMessage {
                    message: Some(self.content.message().clone()),
                    ..self.raw.clone()
                };
                collect_media(self.socket.as_ref(), &target).await
            })
            .await
            .cloned()
    }

    /// Reply in the same chat, quoting this message.
    pub async fn reply(&self, text: impl Into<String> + Send) -> Result<Option<String>> {
        self.socket
            .send_message(
                &self.chat_id,
                OutgoingContent::text(text),
                SendOptions::quoting(&self.raw),
            )
            .await
    }

    pub async fn react(&self, emoji: impl Into<String> + Send) -> Result<Option<String>> {
        self.socket
            .send_message(
                &self.chat_id,
                OutgoingContent::react(emoji, self.raw.key.clone()),
                SendOptions::default(),
            )
            .await
    }
}

impl std::fmt::Debug for CanonicalMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanonicalMessage")
            .field("id", &self.id)
            .field("chat_id", &self.chat_id)
            .field("sender_id", &self.sender_id)
            .field("is_from_self", &self.is_from_self)
            .field("is_group_chat", &self.is_group_chat)
            .field("content_type", &self.content_type)
            .field("body", &self.body)
            .field("quoted", &self.quoted)
            .field("mentioned_ids", &self.mentioned_ids)
            .finish_non_exhaustive()
    }
}

async fn collect_media(socket: &dyn Socket, message: &WebMessage) -> Result<Bytes> {
    let mut stream = socket.download_media(message).await?;
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    debug!(bytes = buf.len(), "media downloaded");
    Ok(buf.freeze())
}
