//! Shared error-context helpers and JID helpers used across all zenor crates.

pub mod error;
pub mod jid;

pub use {
    error::FromMessage,
    jid::{
        STATUS_BROADCAST_JID, is_group_jid, is_status_broadcast, normalize_jid, same_user, user_jid,
    },
};
