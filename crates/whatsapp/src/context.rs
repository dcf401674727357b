use std::sync::Arc;

use {
    tokio::sync::RwLock,
    zenor_config::{BotMode, ZenorConfig},
    zenor_session::CredentialStore,
};

use crate::transport::Socket;

/// Shared state handed to the supervisor and the message pipeline.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ZenorConfig>,
    pub store: CredentialStore,
    socket: Arc<RwLock<Option<Arc<dyn Socket>>>>,
}

impl AppContext {
    pub fn new(config: ZenorConfig) -> Self {
        let store = CredentialStore::new(config.session.dir.clone());
        Self::with_store(config, store)
    }

    pub fn with_store(config: ZenorConfig, store: CredentialStore) -> Self {
        Self {
            config: Arc::new(config),
            store,
            socket: Arc::new(RwLock::new(None)),
        }
    }

    /// Socket of the current connection, if one is live.
    pub async fn socket(&self) -> Option<Arc<dyn Socket>> {
        self.socket.read().await.clone()
    }

    pub async fn set_socket(&self, socket: Option<Arc<dyn Socket>>) {
        *self.socket.write().await = socket;
    }

    pub fn is_private(&self) -> bool {
        self.config.bot.mode == BotMode::Private
    }

    /// Owner jids derived from the configured phone numbers.
    pub fn owner_jids(&self) -> Vec<String> {
        self.config
            .bot
            .owner_numbers
            .iter()
            .filter(|n| n.chars().any(|c| c.is_ascii_digit()))
            .map(|n| zenor_common::user_jid(n))
            .collect()
    }
}
