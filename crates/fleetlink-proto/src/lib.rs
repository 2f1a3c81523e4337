//! Secure session protocol shared by the control server and the agent.
//!
//! This crate provides the fundamental building blocks:
//! - `crypto` - Ephemeral key agreement, key derivation, and AEAD
//! - `handshake` - The raw public key exchange that opens a connection
//! - `framing` - Length-prefixed encrypted frames over a stream socket
//! - `Message` - The typed wire message set
//! - `timing` - Protocol intervals and timeouts shared by both ends

pub mod crypto;
pub mod error;
pub mod framing;
pub mod handshake;
pub mod message;
pub mod timing;

pub use crypto::SessionKey;
pub use error::ProtocolError;
pub use framing::{recv_message, recv_secure, send_message, send_secure};
pub use handshake::{handshake_initiator, handshake_responder};
pub use message::{HostInfo, Message};
