use zenor_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error("sidecar connection failed: {0}")]
    Connection(String),

    #[error("not connected to sidecar")]
    NotConnected,

    #[error("request {request_id} timed out")]
    Timeout { request_id: String },

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("media download failed: {0}")]
    Media(String),

    #[error("gave up reconnecting after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Protocol(#[from] zenor_protocol::Error),

    #[error(transparent)]
    Session(#[from] zenor_session::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

zenor_common::impl_context!();
