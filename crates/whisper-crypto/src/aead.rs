//! ChaCha20-Poly1305 payload encryption.
//!
//! Ratchet message keys are single-use, so the 96-bit nonce taken from
//! the message-key expansion never repeats under the same key. The
//! Poly1305 tag is appended to the ciphertext.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use whisper_types::{Result, WhisperError};

/// Byte length of a ChaCha20-Poly1305 nonce.
pub const NONCE_LEN: usize = 12;

/// Byte length of the appended Poly1305 tag.
pub const TAG_LEN: usize = 16;

/// Encrypts `plaintext` with ChaCha20-Poly1305.
///
/// The returned ciphertext is `plaintext.len() + 16` bytes long.
pub fn encrypt_chacha20(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let payload = Payload { msg: plaintext, aad };

    cipher
        .encrypt(Nonce::from_slice(nonce), payload)
        .map_err(|e| WhisperError::CryptoError {
            reason: format!("ChaCha20-Poly1305 encryption failed: {e}"),
        })
}

/// Decrypts `ciphertext` with ChaCha20-Poly1305.
///
/// # Errors
///
/// Returns [`WhisperError::CryptoError`] if the tag does not verify
/// (wrong key, wrong nonce, tampered ciphertext or wrong AAD).
pub fn decrypt_chacha20(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let payload = Payload {
        msg: ciphertext,
        aad,
    };

    cipher
        .decrypt(Nonce::from_slice(nonce), payload)
        .map_err(|e| WhisperError::CryptoError {
            reason: format!("ChaCha20-Poly1305 decryption failed: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
