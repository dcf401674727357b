//! Capability seams for the chat transport.
//!
//! [`Transport`] opens connections; a [`Connection`] yields an ordered event
//! stream and a [`Socket`] for outbound operations. The production
//! implementation is [`crate::sidecar::SidecarTransport`].

use std::sync::{Arc, Mutex};

use {
    async_trait::async_trait,
    bytes::Bytes,
    futures::{StreamExt, stream::BoxStream},
    tokio::sync::mpsc,
};

use {
    zenor_protocol::{MessageKey, OutgoingContent, SendOptions, TransportEvent, WebMessage},
    zenor_session::CredentialBlob,
};

use crate::error::Result;

/// Media bytes, delivered in chunks as they arrive.
pub type MediaStream = BoxStream<'static, Result<Bytes>>;

#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Generate pairing codes (QR) because no credential exists yet.
    pub pairing: bool,
    /// Browser triple announced to the remote endpoint.
    pub browser: Vec<String>,
}

/// A live connection.
pub struct Connection {
    /// Events in receipt order. The stream ending means the connection is gone.
    pub events: mpsc::Receiver<TransportEvent>,
    pub socket: Arc<dyn Socket>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection. An error here means the connection could not even
    /// be constructed, as opposed to a later close event.
    async fn connect(
        &self,
        credentials: Option<&CredentialBlob>,
        options: &ConnectOptions,
    ) -> Result<Connection>;
}

/// Outbound operations on a live connection.
#[async_trait]
pub trait Socket: Send + Sync {
    /// Send a message, returning the id assigned by the remote side if known.
    async fn send_message(
        &self,
        jid: &str,
        content: OutgoingContent,
        options: SendOptions,
    ) -> Result<Option<String>>;

    async fn read_messages(&self, keys: &[MessageKey]) -> Result<()>;

    async fn download_media(&self, message: &WebMessage) -> Result<MediaStream>;

    /// Own account jid, known once the connection has opened.
    fn self_id(&self) -> Option<String>;
}

/// A message passed to [`Socket::send_message`], as recorded by [`NullSocket`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub jid: String,
    pub content: OutgoingContent,
    pub options: SendOptions,
}

/// Socket that performs no I/O and records every call.
#[derive(Default)]
pub struct NullSocket {
    self_id: Option<String>,
    media: Vec<Bytes>,
    sent: Mutex<Vec<SentMessage>>,
    reads: Mutex<Vec<Vec<MessageKey>>>,
    downloads: Mutex<usize>,
    fail_sends: bool,
}

impl NullSocket {
    pub fn new(self_id: impl Into<String>) -> Self {
        Self {
            self_id: Some(self_id.into()),
            ..Default::default()
        }
    }

    /// Chunks returned by every `download_media` call.
    pub fn with_media(mut self, chunks: Vec<Bytes>) -> Self {
        self.media = chunks;
        self
    }

    /// Make every `send_message` fail.
    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn reads(&self) -> Vec<Vec<MessageKey>> {
        self.reads.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn download_count(&self) -> usize {
        self.downloads.lock().map(|n| *n).unwrap_or_default()
    }
}

#[async_trait]
impl Socket for NullSocket {
    async fn send_message(
        &self,
        jid: &str,
        content: OutgoingContent,
        options: SendOptions,
    ) -> Result<Option<String>> {
        if self.fail_sends {
            return Err(crate::Error::SendFailed("null socket rejects sends".into()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentMessage {
                jid: jid.to_string(),
                content,
                options,
            });
        }
        Ok(None)
    }

    async fn read_messages(&self, keys: &[MessageKey]) -> Result<()> {
        if let Ok(mut reads) = self.reads.lock() {
            reads.push(keys.to_vec());
        }
        Ok(())
    }

    async fn download_media(&self, _message: &WebMessage) -> Result<MediaStream> {
        if let Ok(mut n) = self.downloads.lock() {
            *n += 1;
        }
        let chunks: Vec<Result<Bytes>> = self.media.iter().cloned().map(Ok).collect();
        Ok(futures::stream::iter(chunks).boxed())
    }

    fn self_id(&self) -> Option<String> {
        self.self_id.clone()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, futures::TryStreamExt};

    #[tokio::test]
    async fn null_socket_records_calls() {
        let socket = NullSocket::new("1@s.whatsapp.net").with_media(vec![
            Bytes::from_static(b"ab"),
            Bytes::from_static(b"c"),
        ]);
        socket
            .send_message("2@s.whatsapp.net", OutgoingContent::text("hi"), SendOptions::default())
            .await
            .unwrap();
        socket.read_messages(&[MessageKey::default()]).await.unwrap();

        let chunks: Vec<Bytes> = socket
            .download_media(&WebMessage::default())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(socket.sent().len(), 1);
        assert_eq!(socket.sent()[0].jid, "2@s.whatsapp.net");
        assert_eq!(socket.reads().len(), 1);
        assert_eq!(chunks.concat(), b"abc");
        assert_eq!(socket.download_count(), 1);
        assert_eq!(socket.self_id().as_deref(), Some("1@s.whatsapp.net"));
    }

    #[tokio::test]
    async fn failing_sends() {
        let socket = NullSocket::default().failing_sends();
        assert!(
            socket
                .send_message("x", OutgoingContent::text("hi"), SendOptions::default())
                .await
                .is_err()
        );
        assert!(socket.sent().is_empty());
    }
}
