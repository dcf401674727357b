use serde::{Deserialize, Deserializer, Serialize};

/// Identity of a single message inside a chat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_jid: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
}

/// A raw message as delivered by `messages.upsert`.
///
/// `message` is kept as untyped JSON: its shape depends on the content type
/// and is interpreted by the normalizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebMessage {
    #[serde(default)]
    pub key: MessageKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub message_timestamp: Option<u64>,
}

impl WebMessage {
    /// Whether the message carries any content at all.
    pub fn has_payload(&self) -> bool {
        match &self.message {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Object(map)) => !map.is_empty(),
            Some(_) => true,
        }
    }
}

/// Timestamps arrive as numbers, numeric strings, or `{ low, high }` longs.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        Some(serde_json::Value::Object(map)) => {
            let low = map.get("low").and_then(serde_json::Value::as_i64).unwrap_or(0);
            let high = map.get("high").and_then(serde_json::Value::as_i64).unwrap_or(0);
            let combined = ((high as u64) << 32) | (low as u32 as u64);
            Some(combined)
        },
        _ => None,
    })
}

/// Remote media referenced by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSource {
    pub url: String,
}

/// Emoji reaction targeting an existing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub text: String,
    pub key: MessageKey,
}

/// Content accepted by `send_message`, serialized in the client library's
/// content shape (`{ text }`, `{ image, caption }`, `{ react }`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutgoingContent {
    React {
        react: Reaction,
    },
    Image {
        image: MediaSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        mentions: Vec<String>,
    },
}

impl OutgoingContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            mentions: Vec::new(),
        }
    }

    pub fn react(emoji: impl Into<String>, key: MessageKey) -> Self {
        Self::React {
            react: Reaction {
                text: emoji.into(),
                key,
            },
        }
    }
}

/// Per-send options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendOptions {
    /// Message to quote in the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted: Option<WebMessage>,
}

impl SendOptions {
    pub fn quoting(message: &WebMessage) -> Self {
        Self {
            quoted: Some(message.clone()),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn parses_minimal_group_message() {
        let raw = json!({
            "key": { "remoteJid": "123@g.us", "participant": "456@s.whatsapp.net" },
            "message": { "conversation": "hello" }
        });
        let msg: WebMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.key.remote_jid.as_deref(), Some("123@g.us"));
        assert_eq!(msg.key.participant.as_deref(), Some("456@s.whatsapp.net"));
        assert!(!msg.key.from_me);
        assert!(msg.has_payload());
    }

    #[test]
    fn empty_message_has_no_payload() {
        let msg: WebMessage = serde_json::from_value(json!({
            "key": { "remoteJid": "1@s.whatsapp.net" },
            "message": {}
        }))
        .unwrap();
        assert!(!msg.has_payload());
        assert!(!WebMessage::default().has_payload());
    }

    #[test]
    fn timestamp_forms() {
        let number: WebMessage =
            serde_json::from_value(json!({ "messageTimestamp": 1_700_000_000 })).unwrap();
        assert_eq!(number.message_timestamp, Some(1_700_000_000));

        let string: WebMessage =
            serde_json::from_value(json!({ "messageTimestamp": "42" })).unwrap();
        assert_eq!(string.message_timestamp, Some(42));

        let long: WebMessage = serde_json::from_value(
            json!({ "messageTimestamp": { "low": 7, "high": 0, "unsigned": true } }),
        )
        .unwrap();
        assert_eq!(long.message_timestamp, Some(7));
    }

    #[test]
    fn outgoing_content_shapes() {
        let text = serde_json::to_value(OutgoingContent::text("hi")).unwrap();
        assert_eq!(text, json!({ "text": "hi" }));

        let react = serde_json::to_value(OutgoingContent::react("👍", MessageKey {
            remote_jid: Some("1@s.whatsapp.net".into()),
            id: Some("ABC".into()),
            ..Default::default()
        }))
        .unwrap();
        assert_eq!(
            react,
            json!({ "react": { "text": "👍", "key": {
                "remoteJid": "1@s.whatsapp.net", "fromMe": false, "id": "ABC"
            } } })
        );

        let image = serde_json::to_value(OutgoingContent::Image {
            image: MediaSource {
                url: "https://example.com/a.jpg".into(),
            },
            caption: Some("hey".into()),
        })
        .unwrap();
        assert_eq!(
            image,
            json!({ "image": { "url": "https://example.com/a.jpg" }, "caption": "hey" })
        );
    }
}
