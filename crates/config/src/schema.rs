//! Config schema: session sources, bot behaviour, reconnect policy, sidecar.

use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZenorConfig {
    pub session: SessionConfig,
    pub bot: BotConfig,
    pub welcome: WelcomeConfig,
    pub status: StatusConfig,
    pub reactions: ReactionConfig,
    pub reconnect: ReconnectConfig,
    pub sidecar: SidecarConfig,
    pub cache: CacheConfig,
}

/// Where credentials come from and where they are kept.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory holding `creds.json`.
    pub dir: PathBuf,

    /// Session source string (inline bundle or remote archive reference).
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub source: Option<Secret<String>>,

    /// Prefix marking an inline compressed bundle.
    pub inline_marker: String,

    /// Prefix marking a `fileId#key` remote archive reference.
    pub archive_marker: String,

    /// Base URL of the object store serving encrypted archives.
    /// Remote archives are skipped when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_base_url: Option<String>,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("dir", &self.dir)
            .field("source", &self.source.as_ref().map(|_| "[REDACTED]"))
            .field("inline_marker", &self.inline_marker)
            .field("archive_marker", &self.archive_marker)
            .field("archive_base_url", &self.archive_base_url)
            .finish()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("session"),
            source: None,
            inline_marker: "Zenor~".into(),
            archive_marker: "Gifted~".into(),
            archive_base_url: None,
        }
    }
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// Who the bot answers to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    /// Everyone may trigger handlers.
    #[default]
    Public,
    /// Only the bot account itself and the owners.
    Private,
}

impl std::str::FromStr for BotMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(format!("unknown bot mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub name: String,
    pub mode: BotMode,
    /// Command prefix, passed through to handlers.
    pub prefix: String,
    /// Owner phone numbers (digits only or `+` formatted).
    pub owner_numbers: Vec<String>,
    /// Browser triple announced to the remote endpoint.
    pub browser: Vec<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "Zenor-XMD".into(),
            mode: BotMode::Public,
            prefix: ".".into(),
            owner_numbers: Vec::new(),
            browser: vec!["Buddy-XTR".into(), "safari".into(), "3.3".into()],
        }
    }
}

/// One-time message sent to the bot's own chat after the first connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WelcomeConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub caption: String,
}

impl Default for WelcomeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            image_url: None,
            caption: "*Bot Activated*\n\n> Welcome to Zenor_XMD\n*Enjoy our New whatsapp Bot*"
                .into(),
        }
    }
}

/// Handling of status broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Mark status updates as read.
    pub auto_seen: bool,
    /// Reply to the status author after reading.
    pub auto_reply: bool,
    pub reply_text: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            auto_seen: true,
            auto_reply: false,
            reply_text: "Auto Status Seen Bot By Zenor-XMD".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionConfig {
    /// React to incoming messages with a random emoji.
    pub auto_react: bool,
    pub emojis: Vec<String>,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            auto_react: false,
            emojis: ["❤️", "😂", "🔥", "👍", "😮", "🙏", "🎉", "💯", "😎", "🤝"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Reconnect backoff after a non-terminal close.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of the delay randomly added or removed (0.0 – 1.0).
    pub jitter: f64,
    /// Consecutive failed reconnects before giving up. `None` retries forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 5_000,
            max_delay_ms: 120_000,
            jitter: 0.2,
            max_retries: Some(12),
        }
    }
}

/// Protocol sidecar connection and process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    pub port: u16,
    /// Full WebSocket URL; overrides `port` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Directory containing the sidecar's `package.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Spawn and supervise the sidecar process.
    pub auto_start: bool,
}

impl SidecarConfig {
    pub fn ws_url(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("ws://127.0.0.1:{}", self.port))
    }
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            port: 18790,
            url: None,
            dir: None,
            auto_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of recent raw messages kept for quote lookups.
    pub recent_messages: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            recent_messages: 500,
        }
    }
}
