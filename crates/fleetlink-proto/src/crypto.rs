//! Ephemeral key agreement, key derivation, and authenticated encryption.
//!
//! Each TCP connection gets a fresh [`SessionKey`]: both ends generate an
//! ephemeral X25519 key pair, exchange raw public keys, and derive the key
//! from the shared secret with HKDF-SHA256. All subsequent traffic is
//! AES-256-GCM with a random nonce per frame. Keys live exactly as long as
//! the connection and are never persisted.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use hkdf::Hkdf;
use rand::{RngCore, rngs::OsRng};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::error::ProtocolError;

/// Length of session keys and raw public keys, in bytes.
pub const KEY_LEN: usize = 32;

/// Length of AES-GCM nonces, in bytes.
pub const NONCE_LEN: usize = 12;

/// HKDF context string. Both ends must agree on it byte for byte.
const HKDF_CONTEXT: &[u8] = b"handshake data";

/// Symmetric key for one connection's authenticated encryption.
///
/// Derived once per connection by [`derive_session_key`]; cloning shares
/// the key with the writer half of a split socket, nothing else.
#[derive(Clone)]
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    /// Wrap raw key bytes. Exposed for tests and key derivation only.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Generate an ephemeral X25519 key pair for one handshake.
#[must_use]
pub fn generate_keypair() -> (EphemeralSecret, PublicKey) {
    let secret = EphemeralSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    (secret, public)
}

/// Derive the session key from our ephemeral secret and the peer's raw
/// public key.
///
/// X25519 is symmetric: both ends derive the identical key from their own
/// secret and the other's public key. The secret is consumed so it cannot
/// outlive the handshake.
///
/// # Errors
/// Returns `ProtocolError::KeyDerivation` if HKDF expansion fails.
pub fn derive_session_key(
    secret: EphemeralSecret,
    peer_public: [u8; KEY_LEN],
) -> Result<SessionKey, ProtocolError> {
    let shared = secret.diffie_hellman(&PublicKey::from(peer_public));
    let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut okm = [0u8; KEY_LEN];
    hk.expand(HKDF_CONTEXT, &mut okm)
        .map_err(|_| ProtocolError::KeyDerivation)?;
    Ok(SessionKey(okm))
}

/// Encrypt a payload under the session key with a fresh random nonce.
///
/// Returns the ciphertext (tag appended) and the nonce that produced it.
///
/// # Errors
/// Returns `ProtocolError::Encryption` if the cipher rejects the input.
pub fn encrypt(
    key: &SessionKey,
    plaintext: &[u8],
) -> Result<(Vec<u8>, [u8; NONCE_LEN]), ProtocolError> {
    let cipher =
        Aes256Gcm::new_from_slice(&key.0).map_err(|_| ProtocolError::Encryption)?;
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| ProtocolError::Encryption)?;
    Ok((ciphertext, nonce))
}

/// Decrypt a frame body under the session key.
///
/// # Errors
/// Returns `ProtocolError::Authentication` if the tag does not verify:
/// tampering, a wrong key, or a wrong nonce all land here.
pub fn decrypt(
    key: &SessionKey,
    ciphertext: &[u8],
    nonce: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let cipher =
        Aes256Gcm::new_from_slice(&key.0).map_err(|_| ProtocolError::Authentication)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| ProtocolError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_pair() -> (SessionKey, SessionKey) {
        let (secret_a, public_a) = generate_keypair();
        let (secret_b, public_b) = generate_keypair();
        let key_a = derive_session_key(secret_a, *public_b.as_bytes()).unwrap();
        let key_b = derive_session_key(secret_b, *public_a.as_bytes()).unwrap();
        (key_a, key_b)
    }

    #[test]
    fn handshake_derives_identical_keys() {
        for _ in 0..16 {
            let (key_a, key_b) = key_pair();
            assert_eq!(key_a.as_bytes(), key_b.as_bytes());
        }
    }

    #[test]
    fn distinct_handshakes_derive_distinct_keys() {
        let (first, _) = key_pair();
        let (second, _) = key_pair();
        assert_ne!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn roundtrip_restores_plaintext() {
        let (key, _) = key_pair();
        for payload in [&b""[..], b"x", b"{\"type\":\"heartbeat\"}"] {
            let (ciphertext, nonce) = encrypt(&key, payload).unwrap();
            let plaintext = decrypt(&key, &ciphertext, &nonce).unwrap();
            assert_eq!(plaintext, payload);
        }
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let (key, _) = key_pair();
        let (other, _) = key_pair();
        let (ciphertext, nonce) = encrypt(&key, b"payload").unwrap();
        let err = decrypt(&other, &ciphertext, &nonce).unwrap_err();
        assert!(matches!(err, ProtocolError::Authentication));
    }

    #[test]
    fn bit_flip_fails_authentication() {
        let (key, _) = key_pair();
        let (ciphertext, nonce) = encrypt(&key, b"payload").unwrap();
        for i in 0..ciphertext.len() {
            let mut tampered = ciphertext.clone();
            tampered[i] ^= 0x01;
            assert!(matches!(
                decrypt(&key, &tampered, &nonce),
                Err(ProtocolError::Authentication)
            ));
        }
    }

    #[test]
    fn wrong_nonce_fails_authentication() {
        let (key, _) = key_pair();
        let (ciphertext, nonce) = encrypt(&key, b"payload").unwrap();
        let mut wrong = nonce;
        wrong[0] ^= 0x01;
        assert!(matches!(
            decrypt(&key, &ciphertext, &wrong),
            Err(ProtocolError::Authentication)
        ));
    }

    #[test]
    fn debug_redacts_key_material() {
        let (key, _) = key_pair();
        assert_eq!(format!("{key:?}"), "SessionKey(..)");
    }
}
