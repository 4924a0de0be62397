//! Error types for the host bridge
//!
//! None of these reach the UI layer: the adapter and listener log them and
//! carry on with local state.

use thiserror::Error;

/// Errors raised while talking to the native host
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("host channel unavailable")]
    ChannelUnavailable,

    #[error("failed to post message to host: {0}")]
    Send(String),

    #[error("malformed bridge message: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("bridge message is missing field '{0}'")]
    MissingField(&'static str),

    #[error("unrecognized bridge message type '{0}'")]
    UnknownType(String),

    #[error("bridge listener already installed")]
    AlreadyInstalled,

    #[error("host does not expose a liveness acknowledgment")]
    PingUnsupported,
}

/// Result alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
