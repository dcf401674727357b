//! Inbound pipeline: status interception, normalization, auto-react, mode
//! gate, and handler dispatch.

use std::sync::{Arc, Mutex, PoisonError};

use {
    async_trait::async_trait,
    rand::seq::IndexedRandom,
    serde_json::Value,
    tracing::{debug, info, warn},
};

use {
    zenor_common::{normalize_jid, same_user},
    zenor_protocol::{GroupParticipantsUpdate, MessagesUpsert, UpsertKind, WebMessage},
};

use crate::{
    context::AppContext,
    message::CanonicalMessage,
    normalize::normalize,
    recent::RecentMessages,
    status::{handle_status, is_status},
    transport::Socket,
};

/// Application-level consumer of normalized events.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, message: Arc<CanonicalMessage>);

    async fn on_call(&self, _calls: Vec<Value>) {}

    async fn on_group_update(&self, _update: GroupParticipantsUpdate) {}
}

/// What the pipeline did with one raw message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Status broadcast, marked read in the background and not dispatched.
    Status,
    /// History sync (`append`) upserts are cached only.
    History,
    /// Nothing to act on (no payload, protocol or reaction message).
    Ignored,
    /// Dropped by the private-mode gate.
    Gated,
    /// Handed to handlers.
    Dispatched { id: String },
}

pub struct Pipeline {
    ctx: AppContext,
    handlers: Vec<Arc<dyn MessageHandler>>,
    recent: Mutex<RecentMessages>,
}

impl Pipeline {
    pub fn new(ctx: AppContext) -> Self {
        let capacity = ctx.config.cache.recent_messages;
        Self {
            ctx,
            handlers: Vec::new(),
            recent: Mutex::new(RecentMessages::new(capacity)),
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Process every message of one upsert, in order.
    ///
    /// Never waits on the socket: status reads, reactions and handlers run in
    /// spawned tasks so the caller's event loop keeps going.
    pub fn handle_upsert(
        &self,
        upsert: MessagesUpsert,
        socket: &Arc<dyn Socket>,
    ) -> Vec<Disposition> {
        upsert
            .messages
            .iter()
            .map(|raw| self.handle_message(raw, upsert.kind, socket))
            .collect()
    }

    fn handle_message(
        &self,
        raw: &WebMessage,
        kind: UpsertKind,
        socket: &Arc<dyn Socket>,
    ) -> Disposition {
        if let Some(chat) = raw.key.remote_jid.as_deref() {
            self.remember(&normalize_jid(chat), raw);
        }
        if kind == UpsertKind::Append {
            return Disposition::History;
        }

        if is_status(raw) {
            let config = self.ctx.config.status.clone();
            let raw = raw.clone();
            let socket = Arc::clone(socket);
            tokio::spawn(async move {
                let outcome = handle_status(&config, &raw, socket.as_ref()).await;
                debug!(read = outcome.read, replied = outcome.replied, "status handled");
            });
            return Disposition::Status;
        }

        let Some(message) = normalize(raw, Arc::clone(socket)) else {
            return Disposition::Ignored;
        };
        let message = Arc::new(message);

        if self.ctx.config.reactions.auto_react && !message.is_from_self {
            self.auto_react(&message);
        }

        if !self.allowed(&message) {
            debug!(sender = %message.sender_id, "private mode, message not dispatched");
            return Disposition::Gated;
        }

        debug!(
            id = %message.id,
            chat_id = %message.chat_id,
            content_type = %message.content_type,
            "dispatching message"
        );
        for handler in &self.handlers {
            let handler = Arc::clone(handler);
            let message = Arc::clone(&message);
            tokio::spawn(async move { handler.on_message(message).await });
        }
        Disposition::Dispatched {
            id: message.id.clone(),
        }
    }

    pub fn handle_call(&self, calls: Vec<Value>) {
        info!(count = calls.len(), "incoming call event");
        for handler in &self.handlers {
            let handler = Arc::clone(handler);
            let calls = calls.clone();
            tokio::spawn(async move { handler.on_call(calls).await });
        }
    }

    pub fn handle_group_update(&self, update: GroupParticipantsUpdate) {
        info!(group = %update.id, action = %update.action, "group participants update");
        for handler in &self.handlers {
            let handler = Arc::clone(handler);
            let update = update.clone();
            tokio::spawn(async move { handler.on_group_update(update).await });
        }
    }

    /// Full raw original of the message `message` quotes, if still cached.
    pub fn quoted_original(&self, message: &CanonicalMessage) -> Option<WebMessage> {
        let stanza_id = message.quoted.as_ref()?.stanza_id.as_deref()?;
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&message.chat_id, stanza_id)
            .cloned()
    }

    fn remember(&self, chat_id: &str, raw: &WebMessage) {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chat_id, raw);
    }

    fn allowed(&self, message: &CanonicalMessage) -> bool {
        if !self.ctx.is_private() || message.is_from_self {
            return true;
        }
        let own = message.socket().self_id();
        own.iter()
            .cloned()
            .chain(self.ctx.owner_jids())
            .any(|jid| same_user(&jid, &message.sender_id))
    }

    fn auto_react(&self, message: &Arc<CanonicalMessage>) {
        let emoji = self
            .ctx
            .config
            .reactions
            .emojis
            .choose(&mut rand::rng())
            .cloned();
        let Some(emoji) = emoji else {
            return;
        };
        let message = Arc::clone(message);
        tokio::spawn(async move {
            if let Err(e) = message.react(emoji).await {
                warn!(id = %message.id, error = %e, "auto-react failed");
            }
        });
    }
}
