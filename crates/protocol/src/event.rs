use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    message::WebMessage,
};

/// Event kinds emitted by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ConnectionUpdate,
    CredentialsUpdate,
    MessagesUpsert,
    Call,
    GroupParticipantsUpdate,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::ConnectionUpdate,
        EventKind::CredentialsUpdate,
        EventKind::MessagesUpsert,
        EventKind::Call,
        EventKind::GroupParticipantsUpdate,
    ];

    /// Event name on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionUpdate => "connection.update",
            Self::CredentialsUpdate => "creds.update",
            Self::MessagesUpsert => "messages.upsert",
            Self::Call => "call",
            Self::GroupParticipantsUpdate => "group-participants.update",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

/// Phase reported by a `connection.update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Close,
}

/// Why the transport closed, flattened from the client's error object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastDisconnect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LastDisconnect {
    pub fn reason(&self) -> DisconnectReason {
        DisconnectReason::from_status_code(self.status_code)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_disconnect: Option<LastDisconnect>,
    /// Pairing code to render as a QR image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_new_login: Option<bool>,
    /// Own account jid, reported by the sidecar once the connection is open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub me: Option<String>,
}

impl ConnectionUpdate {
    pub fn close_reason(&self) -> Option<DisconnectReason> {
        (self.connection == Some(ConnectionPhase::Close)).then(|| {
            self.last_disconnect
                .as_ref()
                .map_or(DisconnectReason::Unknown(None), LastDisconnect::reason)
        })
    }
}

/// Close reasons, keyed by the status codes the client library reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    ConnectionClosed,
    ConnectionLost,
    ConnectionReplaced,
    LoggedOut,
    BadSession,
    RestartRequired,
    MultideviceMismatch,
    Forbidden,
    UnavailableService,
    Unknown(Option<u16>),
}

impl DisconnectReason {
    pub fn from_status_code(code: Option<u16>) -> Self {
        match code {
            Some(428) => Self::ConnectionClosed,
            Some(408) => Self::ConnectionLost,
            Some(440) => Self::ConnectionReplaced,
            Some(401) => Self::LoggedOut,
            Some(500) => Self::BadSession,
            Some(515) => Self::RestartRequired,
            Some(411) => Self::MultideviceMismatch,
            Some(403) => Self::Forbidden,
            Some(503) => Self::UnavailableService,
            other => Self::Unknown(other),
        }
    }

    pub fn status_code(self) -> Option<u16> {
        match self {
            Self::ConnectionClosed => Some(428),
            Self::ConnectionLost => Some(408),
            Self::ConnectionReplaced => Some(440),
            Self::LoggedOut => Some(401),
            Self::BadSession => Some(500),
            Self::RestartRequired => Some(515),
            Self::MultideviceMismatch => Some(411),
            Self::Forbidden => Some(403),
            Self::UnavailableService => Some(503),
            Self::Unknown(code) => code,
        }
    }

    /// The session was revoked; reconnecting with the same credentials is pointless.
    pub fn is_logged_out(self) -> bool {
        self == Self::LoggedOut
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ConnectionClosed => "connection-closed",
            Self::ConnectionLost => "connection-lost",
            Self::ConnectionReplaced => "connection-replaced",
            Self::LoggedOut => "logged-out",
            Self::BadSession => "bad-session",
            Self::RestartRequired => "restart-required",
            Self::MultideviceMismatch => "multidevice-mismatch",
            Self::Forbidden => "forbidden",
            Self::UnavailableService => "unavailable-service",
            Self::Unknown(_) => "unknown",
        };
        match self.status_code() {
            Some(code) => write!(f, "{name} ({code})"),
            None => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertKind {
    /// New messages received live.
    #[default]
    Notify,
    /// Messages synced from history or appended locally.
    Append,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagesUpsert {
    #[serde(default)]
    pub messages: Vec<WebMessage>,
    #[serde(default, rename = "type")]
    pub kind: UpsertKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupParticipantsUpdate {
    pub id: String,
    #[serde(default)]
    pub participants: Vec<String>,
    /// `add`, `remove`, `promote` or `demote`.
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// A decoded transport event.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    ConnectionUpdate(ConnectionUpdate),
    /// Full, updated credential state. Opaque to zenor.
    CredentialsUpdate(serde_json::Value),
    MessagesUpsert(MessagesUpsert),
    Call(Vec<serde_json::Value>),
    GroupParticipantsUpdate(GroupParticipantsUpdate),
}

impl TransportEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ConnectionUpdate(_) => EventKind::ConnectionUpdate,
            Self::CredentialsUpdate(_) => EventKind::CredentialsUpdate,
            Self::MessagesUpsert(_) => EventKind::MessagesUpsert,
            Self::Call(_) => EventKind::Call,
            Self::GroupParticipantsUpdate(_) => EventKind::GroupParticipantsUpdate,
        }
    }

    /// Decode an event from its wire name and payload.
    ///
    /// Returns `Ok(None)` for event names zenor does not subscribe to.
    pub fn from_wire(name: &str, data: serde_json::Value) -> Result<Option<Self>> {
        let Some(kind) = EventKind::from_wire(name) else {
            return Ok(None);
        };
        let malformed = |source| Error::Malformed {
            kind: kind.as_str(),
            source,
        };
        let event = match kind {
            EventKind::ConnectionUpdate => {
                Self::ConnectionUpdate(serde_json::from_value(data).map_err(malformed)?)
            },
            EventKind::CredentialsUpdate => Self::CredentialsUpdate(data),
            EventKind::MessagesUpsert => {
                Self::MessagesUpsert(serde_json::from_value(data).map_err(malformed)?)
            },
            EventKind::Call => Self::Call(match data {
                serde_json::Value::Array(calls) => calls,
                other => vec![other],
            }),
            EventKind::GroupParticipantsUpdate => {
                Self::GroupParticipantsUpdate(serde_json::from_value(data).map_err(malformed)?)
            },
        };
        Ok(Some(event))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, serde_json::json};

    #[rstest]
    #[case(Some(401), DisconnectReason::LoggedOut)]
    #[case(Some(428), DisconnectReason::ConnectionClosed)]
    #[case(Some(515), DisconnectReason::RestartRequired)]
    #[case(Some(999), DisconnectReason::Unknown(Some(999)))]
    #[case(None, DisconnectReason::Unknown(None))]
    fn reason_from_code(#[case] code: Option<u16>, #[case] expected: DisconnectReason) {
        assert_eq!(DisconnectReason::from_status_code(code), expected);
        assert_eq!(expected.status_code(), code);
    }

    #[test]
    fn only_logged_out_is_terminal() {
        assert!(DisconnectReason::LoggedOut.is_logged_out());
        assert!(!DisconnectReason::ConnectionLost.is_logged_out());
        assert!(!DisconnectReason::Unknown(None).is_logged_out());
    }

    #[test]
    fn close_reason_defaults_to_unknown() {
        let update = ConnectionUpdate {
            connection: Some(ConnectionPhase::Close),
            ..Default::default()
        };
        assert_eq!(update.close_reason(), Some(DisconnectReason::Unknown(None)));

        let open = ConnectionUpdate {
            connection: Some(ConnectionPhase::Open),
            ..Default::default()
        };
        assert_eq!(open.close_reason(), None);
    }

    #[test]
    fn decodes_connection_close() {
        let event = TransportEvent::from_wire(
            "connection.update",
            json!({ "connection": "close", "lastDisconnect": { "statusCode": 401 } }),
        )
        .unwrap()
        .unwrap();
        let TransportEvent::ConnectionUpdate(update) = event else {
            panic!("expected connection update");
        };
        assert_eq!(update.close_reason(), Some(DisconnectReason::LoggedOut));
    }

    #[test]
    fn decodes_upsert() {
        let event = TransportEvent::from_wire(
            "messages.upsert",
            json!({
                "type": "notify",
                "messages": [{ "key": { "remoteJid": "1@s.whatsapp.net", "id": "A" },
                               "message": { "conversation": "hi" } }]
            }),
        )
        .unwrap()
        .unwrap();
        assert_eq!(event.kind(), EventKind::MessagesUpsert);
        let TransportEvent::MessagesUpsert(upsert) = event else {
            panic!("expected upsert");
        };
        assert_eq!(upsert.messages.len(), 1);
        assert_eq!(upsert.kind, UpsertKind::Notify);
    }

    #[test]
    fn single_call_object_is_wrapped() {
        let event = TransportEvent::from_wire("call", json!({ "id": "c1" }))
            .unwrap()
            .unwrap();
        assert_eq!(event, TransportEvent::Call(vec![json!({ "id": "c1" })]));
    }

    #[test]
    fn unknown_event_is_ignored() {
        assert!(
            TransportEvent::from_wire("presence.update", json!({}))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let err = TransportEvent::from_wire("group-participants.update", json!({ "id": 5 }))
            .unwrap_err();
        assert!(err.to_string().contains("group-participants.update"));
    }
}
