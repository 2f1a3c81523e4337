//! Protocol error type.

use thiserror::Error;

/// Errors raised by the secure channel and message layer.
///
/// Any of these is fatal to the session it occurred on: the agent resets
/// to its connect state, the server tears the affected connection down.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o failure on secure channel: {0}")]
    Io(#[from] std::io::Error),
    #[error("peer closed the connection")]
    ConnectionClosed,
    #[error("frame length {0} exceeds the maximum frame size")]
    FrameTooLarge(usize),
    #[error("frame of {0} bytes is too short to carry a nonce")]
    FrameTooShort(usize),
    #[error("encryption failed")]
    Encryption,
    #[error("frame failed authentication")]
    Authentication,
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("malformed message payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unexpected message type, expected {expected}")]
    UnexpectedMessage { expected: &'static str },
}
