//! Raw public key exchange opening each connection.
//!
//! The very first bytes on a new connection are unframed: each side sends
//! its raw 32-byte X25519 public key. The dialer writes first; the
//! acceptor reads first. Everything after this exchange is encrypted
//! framing under the derived session key.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::crypto::{self, KEY_LEN, SessionKey};
use crate::error::ProtocolError;
use crate::framing::read_exact_or_closed;

/// Dial-side handshake: send our public key, read the peer's, derive.
///
/// # Errors
/// Any I/O failure or early close aborts the handshake; the caller is
/// expected to reconnect.
pub async fn handshake_initiator<S>(conn: &mut S) -> Result<SessionKey, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (secret, public) = crypto::generate_keypair();
    conn.write_all(public.as_bytes()).await?;
    conn.flush().await?;

    let mut peer = [0u8; KEY_LEN];
    read_exact_or_closed(conn, &mut peer).await?;
    crypto::derive_session_key(secret, peer)
}

/// Accept-side handshake: read the peer's public key, send ours, derive.
///
/// # Errors
/// Any I/O failure or early close aborts the handshake; the caller is
/// expected to drop the connection.
pub async fn handshake_responder<S>(conn: &mut S) -> Result<SessionKey, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut peer = [0u8; KEY_LEN];
    read_exact_or_closed(conn, &mut peer).await?;

    let (secret, public) = crypto::generate_keypair();
    conn.write_all(public.as_bytes()).await?;
    conn.flush().await?;
    crypto::derive_session_key(secret, peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{recv_secure, send_secure};

    #[tokio::test]
    async fn both_ends_derive_the_same_key() {
        let (mut client, mut server) = tokio::io::duplex(256);

        let (client_key, server_key) = tokio::join!(
            handshake_initiator(&mut client),
            handshake_responder(&mut server),
        );
        let client_key = client_key.unwrap();
        let server_key = server_key.unwrap();
        assert_eq!(client_key.as_bytes(), server_key.as_bytes());

        // The derived keys must actually interoperate.
        send_secure(&mut client, &client_key, b"ping").await.unwrap();
        assert_eq!(recv_secure(&mut server, &server_key).await.unwrap(), b"ping");
    }

    #[tokio::test]
    async fn keys_are_fresh_per_connection() {
        let mut keys = Vec::new();
        for _ in 0..4 {
            let (mut client, mut server) = tokio::io::duplex(256);
            let (client_key, _) = tokio::join!(
                handshake_initiator(&mut client),
                handshake_responder(&mut server),
            );
            keys.push(*client_key.unwrap().as_bytes());
        }
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), 4);
    }

    #[tokio::test]
    async fn responder_reports_closed_peer() {
        let (client, mut server) = tokio::io::duplex(256);
        drop(client);

        let err = handshake_responder(&mut server).await.unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionClosed));
    }
}
