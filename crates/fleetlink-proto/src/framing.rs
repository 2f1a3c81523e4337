//! Length-prefixed encrypted framing over a stream socket.
//!
//! Wire layout per frame: a 4-byte big-endian length `N`, then `N` bytes
//! holding the 12-byte nonce followed by the AES-256-GCM ciphertext and
//! tag. Functions are generic over the tokio I/O traits so the same code
//! runs over a `TcpStream`, its split halves, or an in-memory duplex in
//! tests.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::crypto::{self, NONCE_LEN, SessionKey};
use crate::error::ProtocolError;
use crate::message::Message;

/// Upper bound on a frame body. Anything larger is treated as a protocol
/// violation rather than an allocation request.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Read exactly `buf.len()` bytes, mapping EOF to `ConnectionClosed`.
///
/// A stream socket may deliver fewer bytes than requested per read;
/// `read_exact` loops until the buffer is full. A zero-length read at any
/// point means the peer closed the connection, which must never surface
/// as empty data.
pub(crate) async fn read_exact_or_closed<R>(
    conn: &mut R,
    buf: &mut [u8],
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    conn.read_exact(buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::ConnectionClosed
        } else {
            ProtocolError::Io(e)
        }
    })?;
    Ok(())
}

/// Encrypt a payload and write it as one frame.
///
/// # Errors
/// Returns an error if encryption fails or the write does not complete;
/// a failed send is fatal to the session, there is no partial-frame retry.
pub async fn send_secure<W>(
    conn: &mut W,
    key: &SessionKey,
    payload: &[u8],
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let (ciphertext, nonce) = crypto::encrypt(key, payload)?;
    let body_len = NONCE_LEN + ciphertext.len();
    if body_len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(body_len));
    }

    let mut frame = Vec::with_capacity(4 + body_len);
    frame.extend_from_slice(&(body_len as u32).to_be_bytes());
    frame.extend_from_slice(&nonce);
    frame.extend_from_slice(&ciphertext);
    conn.write_all(&frame).await?;
    conn.flush().await?;
    Ok(())
}

/// Read one frame and decrypt its payload.
///
/// # Errors
/// Returns `ConnectionClosed` on EOF, `FrameTooLarge`/`FrameTooShort` on
/// an implausible length prefix, and `Authentication` if the frame body
/// does not verify under `key`.
pub async fn recv_secure<R>(conn: &mut R, key: &SessionKey) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    read_exact_or_closed(conn, &mut len_buf).await?;
    let body_len = u32::from_be_bytes(len_buf) as usize;
    if body_len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(body_len));
    }
    if body_len < NONCE_LEN {
        return Err(ProtocolError::FrameTooShort(body_len));
    }

    let mut body = vec![0u8; body_len];
    read_exact_or_closed(conn, &mut body).await?;
    let (nonce, ciphertext) = body.split_at(NONCE_LEN);
    crypto::decrypt(key, ciphertext, nonce)
}

/// Serialize a message and send it as one encrypted frame.
///
/// # Errors
/// See [`send_secure`].
pub async fn send_message<W>(
    conn: &mut W,
    key: &SessionKey,
    message: &Message,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(message)?;
    send_secure(conn, key, &payload).await
}

/// Receive one encrypted frame and decode its message.
///
/// # Errors
/// See [`recv_secure`]; additionally returns `Malformed` when the
/// plaintext is not a valid message.
pub async fn recv_message<R>(conn: &mut R, key: &SessionKey) -> Result<Message, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let payload = recv_secure(conn, key).await?;
    Ok(serde_json::from_slice(&payload)?)
}
