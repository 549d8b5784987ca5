use sqlrelay_frame::FrameError;

use crate::endpoint::Role;

/// Errors that can occur in relay host operations.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The worker process could not be started. Fatal: the relay never
    /// starts.
    #[error("worker spawn failed: {0}")]
    Spawn(String),

    /// Malformed framing on a channel. The channel is torn down.
    #[error("framing error on {role} channel: {source}")]
    Framing {
        role: Role,
        #[source]
        source: FrameError,
    },

    /// A send failed partway. The channel is dead.
    #[error("write failed on {role} channel: {source}")]
    ChannelWrite {
        role: Role,
        #[source]
        source: FrameError,
    },

    /// The channel closed (EOF, worker exit, or local close).
    #[error("{role} channel closed")]
    ChannelClosed { role: Role },

    /// A pump loop terminated abnormally.
    #[error("relay pump terminated abnormally")]
    PumpFailed,
}

pub type Result<T> = std::result::Result<T, HostError>;
