//! Helpers for chat identifiers (`user[:device]@server`).

/// Reserved chat id carrying status updates instead of a direct or group chat.
pub const STATUS_BROADCAST_JID: &str = "status@broadcast";

/// Server suffix used by group chats.
pub const GROUP_SERVER: &str = "g.us";

/// Server suffix used by individual users.
pub const USER_SERVER: &str = "s.whatsapp.net";

/// Strip the device and agent parts from a jid.
///
/// `4412345:7@s.whatsapp.net` becomes `4412345@s.whatsapp.net`. Inputs that
/// have no user or no server part are returned unchanged.
pub fn normalize_jid(jid: &str) -> String {
    let Some((user_combined, server)) = jid.split_once('@') else {
        return jid.to_string();
    };
    let user_agent = user_combined.split(':').next().unwrap_or_default();
    let user = user_agent.split('_').next().unwrap_or_default();
    if user.is_empty() || server.is_empty() {
        return jid.to_string();
    }
    format!("{user}@{server}")
}

pub fn is_group_jid(jid: &str) -> bool {
    jid.ends_with(&format!("@{GROUP_SERVER}"))
}

pub fn is_status_broadcast(jid: &str) -> bool {
    jid == STATUS_BROADCAST_JID
}

/// Whether two jids refer to the same account, ignoring device suffixes.
pub fn same_user(a: &str, b: &str) -> bool {
    normalize_jid(a) == normalize_jid(b)
}

/// Build a user jid from a bare phone number (`+44 123` → `44123@s.whatsapp.net`).
pub fn user_jid(number: &str) -> String {
    let digits: String = number.chars().filter(char::is_ascii_digit).collect();
    format!("{digits}@{USER_SERVER}")
}
