//! WhatsApp Web bot runtime for zenor.
//!
//! Talks to the WhatsApp Web client library through a Node.js sidecar
//! (see [`sidecar`]), keeps the connection alive ([`supervisor`]) and turns
//! raw message events into [`CanonicalMessage`]s for registered handlers.

pub mod content;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod normalize;
pub mod process;
pub mod recent;
pub mod retry;
pub mod sidecar;
pub mod status;
pub mod supervisor;
pub mod transport;

pub use {
    content::{Content, content_type_of},
    context::AppContext,
    dispatch::{Disposition, MessageHandler, Pipeline},
    error::{Error, Result},
    message::{CanonicalMessage, Quoted, QuotedKind},
    normalize::{message_body, normalize},
    process::{SidecarLaunch, SidecarProcess, find_sidecar_dir},
    recent::RecentMessages,
    retry::RetryPolicy,
    sidecar::{SidecarSocket, SidecarTransport},
    status::{StatusOutcome, handle_status, is_status},
    supervisor::{ConnectionState, Supervisor, SupervisorExit},
    transport::{ConnectOptions, Connection, MediaStream, NullSocket, SentMessage, Socket, Transport},
};
