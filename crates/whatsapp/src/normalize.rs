//! Raw upsert → [`CanonicalMessage`].

use std::sync::Arc;

use {serde_json::Value, tokio::sync::OnceCell};

use {
    zenor_common::{is_group_jid, normalize_jid},
    zenor_protocol::{MessageKey, WebMessage},
};

use crate::{
    content::Content,
    message::{CanonicalMessage, Quoted, QuotedKind},
    transport::Socket,
};

/// Content types that never reach handlers.
const IGNORED_TYPES: [&str; 2] = ["protocolMessage", "reactionMessage"];

/// Build the canonical form of `raw`. `None` when there is nothing to act on:
/// no payload, no chat id, or a protocol/reaction message.
pub fn normalize(raw: &WebMessage, socket: Arc<dyn Socket>) -> Option<CanonicalMessage> {
    if !raw.has_payload() {
        return None;
    }
    let content = Content::parse(raw.message.as_ref()?)?;
    if IGNORED_TYPES.contains(&content.content_type()) {
        return None;
    }

    let chat_id = normalize_jid(raw.key.remote_jid.as_deref().filter(|j| !j.is_empty())?);
    let is_group_chat = is_group_jid(&chat_id);
    let is_from_self = raw.key.from_me;
    let self_id = socket.self_id().map(|id| normalize_jid(&id));

    let sender_id = if is_group_chat {
        raw.key
            .participant
            .as_deref()
            .map(normalize_jid)
            .unwrap_or_else(|| chat_id.clone())
    } else if is_from_self {
        self_id.clone().unwrap_or_else(|| chat_id.clone())
    } else {
        chat_id.clone()
    };

    let quoted = resolve_quoted(&content, &chat_id, self_id.as_deref(), &socket);
    let mentioned_ids = mentions(&content, quoted.as_ref());
    let body = message_body(&content);

    Some(CanonicalMessage {
        id: raw.key.id.clone().unwrap_or_default(),
        chat_id,
        sender_id,
        is_from_self,
        is_group_chat,
        content_type: content.content_type().to_string(),
        content,
        body,
        quoted,
        mentioned_ids,
        push_name: raw.push_name.clone(),
        timestamp: raw.message_timestamp,
        raw: raw.clone(),
        socket,
        media: OnceCell::new(),
    })
}

/// Display text of a message, or `""` for content without any.
pub fn message_body(content: &Content) -> String {
    let message = content.message();
    let payload = content.payload();
    let field = |path: &[&str]| -> Option<String> {
        path.iter()
            .try_fold(payload?, |v, key| v.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    message
        .get("conversation")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| field(&["text"]))
        .or_else(|| field(&["caption"]))
        .or_else(|| match content.content_type() {
            "listResponseMessage" => field(&["singleSelectReply", "selectedRowId"]),
            "buttonsResponseMessage" => field(&["selectedButtonId"]),
            "templateButtonReplyMessage" => field(&["selectedId"]),
            _ => None,
        })
        .unwrap_or_default()
}

/// Resolve `contextInfo.quotedMessage`. Any malformed piece yields `None`.
fn resolve_quoted(
    content: &Content,
    chat_id: &str,
    self_id: Option<&str>,
    socket: &Arc<dyn Socket>,
) -> Option<Quoted> {
    let context = content.context_info()?;
    let quoted_content = Content::parse(context.get("quotedMessage")?)?;

    let kind = if quoted_content.is_view_once() {
        QuotedKind::ViewOnce
    } else if quoted_content.is_ephemeral() {
        QuotedKind::Ephemeral
    } else {
        QuotedKind::Normal
    };

    let stanza_id = string_field(context, "stanzaId");
    let sender_id = string_field(context, "participant").map(|p| normalize_jid(&p));
    let is_self = matches!((&sender_id, self_id), (Some(sender), Some(me)) if sender == me);

    let key = MessageKey {
        remote_jid: Some(chat_id.to_string()),
        from_me: is_self,
        id: stanza_id.clone(),
        participant: sender_id.clone(),
    };

    Some(Quoted::new(
        kind,
        stanza_id,
        sender_id,
        is_self,
        quoted_content.content_type().to_string(),
        quoted_body(quoted_content.payload()),
        key,
        quoted_content.message().clone(),
        Arc::clone(socket),
    ))
}

fn quoted_body(payload: Option<&Value>) -> String {
    let Some(payload) = payload else {
        return String::new();
    };
    let text_at = |path: &[&str]| {
        path.iter()
            .try_fold(payload, |v, key| v.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };
    text_at(&["text"])
        .or_else(|| text_at(&["description"]))
        .or_else(|| text_at(&["caption"]))
        .or_else(|| text_at(&["hydratedTemplate", "hydratedContentText"]))
        .or_else(|| payload.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Quoted sender first, then `contextInfo.mentionedJid`, without duplicates.
fn mentions(content: &Content, quoted: Option<&Quoted>) -> Vec<String> {
    let quoted_sender = quoted.and_then(|q| q.sender_id.clone());
    let mentioned = content
        .context_info()
        .and_then(|ctx| ctx.get("mentionedJid"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .filter(|jid| !jid.is_empty())
        .map(str::to_string);

    let mut out: Vec<String> = Vec::new();
    for jid in quoted_sender.into_iter().chain(mentioned) {
        if !out.contains(&jid) {
            out.push(jid);
        }
    }
    out
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
