//! Message content as a tagged union over the wrapper shapes.
//!
//! A raw message object maps content-type keys to payloads, e.g.
//! `{ "imageMessage": { "caption": "hi", .. } }`. Two wrappers nest the real
//! content one level deeper under `<wrapper>.message`:
//!
//! - `ephemeralMessage`, which may wrap a view-once wrapper or plain content
//! - `viewOnceMessage`, `viewOnceMessageV2`, `viewOnceMessageV2Extension`,
//!   which wrap plain content

use serde_json::Value;

const EPHEMERAL: &str = "ephemeralMessage";
const VIEW_ONCE: [&str; 3] = [
    "viewOnceMessage",
    "viewOnceMessageV2",
    "viewOnceMessageV2Extension",
];

/// Sits beside the real content and never names it.
const SENDER_KEY_DISTRIBUTION: &str = "senderKeyDistributionMessage";

#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Ephemeral(Box<Content>),
    ViewOnce(Box<Content>),
    Plain {
        content_type: String,
        /// The message object holding `content_type`.
        message: Value,
    },
}

/// How deep in the wrapper chain parsing currently is.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Level {
    Top,
    InEphemeral,
    InViewOnce,
}

impl Content {
    /// Parse a raw message object. `None` when it holds no recognizable content.
    pub fn parse(message: &Value) -> Option<Self> {
        Self::parse_at(message, Level::Top)
    }

    fn parse_at(message: &Value, level: Level) -> Option<Self> {
        let map = message.as_object()?;

        if level == Level::Top
            && let Some(inner) = map.get(EPHEMERAL).and_then(|w| w.get("message"))
        {
            return Self::parse_at(inner, Level::InEphemeral).map(|c| Self::Ephemeral(Box::new(c)));
        }
        if level != Level::InViewOnce
            && let Some(inner) = VIEW_ONCE
                .iter()
                .find_map(|key| map.get(*key).and_then(|w| w.get("message")))
        {
            return Self::parse_at(inner, Level::InViewOnce).map(|c| Self::ViewOnce(Box::new(c)));
        }

        content_type_of(message).map(|content_type| Self::Plain {
            content_type: content_type.to_string(),
            message: message.clone(),
        })
    }

    /// The innermost plain content.
    pub fn plain(&self) -> (&str, &Value) {
        match self {
            Self::Ephemeral(inner) | Self::ViewOnce(inner) => inner.plain(),
            Self::Plain {
                content_type,
                message,
            } => (content_type, message),
        }
    }

    pub fn content_type(&self) -> &str {
        self.plain().0
    }

    /// Unwrapped message object holding the content.
    pub fn message(&self) -> &Value {
        self.plain().1
    }

    /// Payload under the content-type key.
    pub fn payload(&self) -> Option<&Value> {
        let (content_type, message) = self.plain();
        message.get(content_type)
    }

    pub fn is_view_once(&self) -> bool {
        match self {
            Self::ViewOnce(_) => true,
            Self::Ephemeral(inner) => inner.is_view_once(),
            Self::Plain { .. } => false,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Ephemeral(_))
    }

    /// `contextInfo` of the payload, if any.
    pub fn context_info(&self) -> Option<&Value> {
        self.payload()?.get("contextInfo")
    }

    pub fn is_media(&self) -> bool {
        matches!(
            self.content_type(),
            "imageMessage"
                | "videoMessage"
                | "audioMessage"
                | "documentMessage"
                | "stickerMessage"
        )
    }
}

/// Content-type key of a message object: `conversation` or the first key
/// ending in `Message`.
pub fn content_type_of(message: &Value) -> Option<&str> {
    let map = message.as_object()?;
    if map.contains_key("conversation") {
        return Some("conversation");
    }
    map.keys()
        .map(String::as_str)
        .find(|k| k.ends_with("Message") && *k != SENDER_KEY_DISTRIBUTION)
}
