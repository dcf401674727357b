//! Wire model for the chat transport.
//!
//! Raw messages and events use the shapes emitted by the protocol sidecar
//! (camelCase JSON, as produced by the upstream client library). Frames in
//! [`frame`] wrap them for the WebSocket bridge between zenor and the sidecar.

pub mod error;
pub mod event;
pub mod frame;
pub mod message;

pub use {
    error::{Error, Result},
    event::{
        ConnectionPhase, ConnectionUpdate, DisconnectReason, EventKind, GroupParticipantsUpdate,
        LastDisconnect, MessagesUpsert, TransportEvent, UpsertKind,
    },
    frame::{GatewayFrame, SidecarFrame},
    message::{MediaSource, MessageKey, OutgoingContent, Reaction, SendOptions, WebMessage},
};

/// Default port of the sidecar WebSocket server.
pub const DEFAULT_SIDECAR_PORT: u16 = 18790;

/// Timeout for a request/ack round trip with the sidecar, in milliseconds.
pub const REQUEST_TIMEOUT_MS: u64 = 30_000;
