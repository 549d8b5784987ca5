/// Errors that can occur during message framing and envelope decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header block is malformed or missing `Content-Length`.
    #[error("invalid frame header: {0}")]
    InvalidHeader(String),

    /// The payload is not a classifiable JSON-RPC envelope.
    #[error("invalid message envelope: {0}")]
    InvalidEnvelope(String),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream closed before a complete message was received.
    #[error("connection closed (incomplete message)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
