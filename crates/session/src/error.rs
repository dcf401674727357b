use zenor_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("unrecognized compression header {0:02x?}")]
    UnrecognizedCompression(Vec<u8>),

    #[error("decompression failed: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("invalid archive reference: {0}")]
    InvalidArchiveRef(String),

    #[error("archive fetch returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("archive decryption failed: {0}")]
    Decrypt(String),
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

zenor_common::impl_context!();
