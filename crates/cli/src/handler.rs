use std::sync::Arc;

use {
    async_trait::async_trait,
    serde_json::Value,
    tracing::{debug, info},
    zenor_protocol::GroupParticipantsUpdate,
    zenor_whatsapp::{CanonicalMessage, MessageHandler},
};

/// Default handler of the binary: records what arrives.
pub struct LoggingHandler {
    prefix: String,
}

impl LoggingHandler {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn on_message(&self, message: Arc<CanonicalMessage>) {
        if let Some((command, args)) = message.command(&self.prefix) {
            info!(
                chat_id = %message.chat_id,
                sender_id = %message.sender_id,
                %command,
                args,
                "command received"
            );
            return;
        }
        debug!(
            chat_id = %message.chat_id,
            sender_id = %message.sender_id,
            content_type = %message.content_type,
            quoted = message.quoted.is_some(),
            "message received"
        );
    }

    async fn on_call(&self, calls: Vec<Value>) {
        info!(count = calls.len(), "incoming call");
    }

    async fn on_group_update(&self, update: GroupParticipantsUpdate) {
        info!(
            group = %update.id,
            action = %update.action,
            participants = update.participants.len(),
            "group participants changed"
        );
    }
}
