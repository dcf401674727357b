//! Status broadcast interception.

use {
    tracing::{debug, warn},
    zenor_common::{is_status_broadcast, normalize_jid},
    zenor_config::StatusConfig,
    zenor_protocol::{OutgoingContent, SendOptions, WebMessage},
};

use crate::transport::Socket;

/// What was done with a status update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusOutcome {
    pub read: bool,
    pub replied: bool,
}

pub fn is_status(raw: &WebMessage) -> bool {
    raw.key.remote_jid.as_deref().is_some_and(is_status_broadcast)
}

/// Mark a status update as read and optionally answer its author.
///
/// The reply goes to `participant`, falling back to the chat id. Replies are
/// only sent for updates that were marked read. Own updates are ignored.
pub async fn handle_status(
    config: &StatusConfig,
    raw: &WebMessage,
    socket: &dyn Socket,
) -> StatusOutcome {
    let mut outcome = StatusOutcome::default();
    if raw.key.from_me || !raw.has_payload() || !config.auto_seen {
        return outcome;
    }

    match socket.read_messages(std::slice::from_ref(&raw.key)).await {
        Ok(()) => outcome.read = true,
        Err(e) => {
            warn!(error = %e, "failed to mark status as read");
            return outcome;
        },
    }

    let author = raw
        .key
        .participant
        .as_deref()
        .or(raw.key.remote_jid.as_deref())
        .map(normalize_jid);
    debug!(author = ?author, "status marked as read");

    if config.auto_reply
        && let Some(author) = author
    {
        match socket
            .send_message(
                &author,
                OutgoingContent::text(config.reply_text.clone()),
                SendOptions::quoting(raw),
            )
            .await
        {
            Ok(_) => outcome.replied = true,
            Err(e) => warn!(%author, error = %e, "status auto-reply failed"),
        }
    }
    outcome
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::transport::NullSocket, serde_json::json};

    fn status_update(from_me: bool) -> WebMessage {
        serde_json::from_value(json!({
            "key": {
                "remoteJid": "status@broadcast",
                "participant": "44:2@s.whatsapp.net",
                "id": "S1",
                "fromMe": from_me
            },
            "message": { "imageMessage": { "caption": "sunset" } }
        }))
        .unwrap()
    }

    fn config(auto_seen: bool, auto_reply: bool) -> StatusConfig {
        StatusConfig {
            auto_seen,
            auto_reply,
            reply_text: "seen it".into(),
        }
    }

    #[tokio::test]
    async fn marks_read_without_reply() {
        let socket = NullSocket::new("1@s.whatsapp.net");
        let raw = status_update(false);
        let outcome = handle_status(&config(true, false), &raw, &socket).await;
        assert_eq!(outcome, StatusOutcome {
            read: true,
            replied: false
        });
        assert_eq!(socket.reads(), vec![vec![raw.key.clone()]]);
        assert!(socket.sent().is_empty());
    }

    #[tokio::test]
    async fn replies_to_author_quoting_update() {
        let socket = NullSocket::new("1@s.whatsapp.net");
        let raw = status_update(false);
        let outcome = handle_status(&config(true, true), &raw, &socket).await;
        assert!(outcome.replied);
        let sent = socket.sent();
        assert_eq!(sent[0].jid, "44@s.whatsapp.net");
        assert_eq!(sent[0].content, OutgoingContent::text("seen it"));
        assert_eq!(sent[0].options.quoted.as_ref(), Some(&raw));
    }

    #[tokio::test]
    async fn disabled_or_own_updates_do_nothing() {
        let socket = NullSocket::new("1@s.whatsapp.net");
        handle_status(&config(false, true), &status_update(false), &socket).await;
        handle_status(&config(true, true), &status_update(true), &socket).await;
        assert!(socket.reads().is_empty());
        assert!(socket.sent().is_empty());
    }

    #[tokio::test]
    async fn reply_failure_is_swallowed() {
        let socket = NullSocket::new("1@s.whatsapp.net").failing_sends();
        let outcome = handle_status(&config(true, true), &status_update(false), &socket).await;
        assert!(outcome.read);
        assert!(!outcome.replied);
    }

    #[test]
    fn detects_status_chat() {
        assert!(is_status(&status_update(false)));
        assert!(!is_status(&WebMessage::default()));
    }
}
