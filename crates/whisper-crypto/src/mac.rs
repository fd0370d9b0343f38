//! HMAC-SHA256 message authentication codes.
//!
//! Used both as the chain-key step of the symmetric ratchet and as the
//! per-message MAC over `associated data || header || ciphertext`.
//! Verification runs in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use whisper_types::{Result, WhisperError};

type HmacSha256 = Hmac<Sha256>;

/// Fixed output length of HMAC-SHA256 in bytes.
pub const HMAC_SHA256_LEN: usize = 32;

fn keyed(key: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(key).map_err(|e| WhisperError::CryptoError {
        reason: format!("HMAC-SHA256 key init failed: {e}"),
    })
}

/// Computes HMAC-SHA256 over `data` using `key`.
///
/// # Errors
///
/// Returns [`WhisperError::CryptoError`] if HMAC initialisation fails
/// (does not happen with SHA-256, but we avoid `unwrap`).
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; HMAC_SHA256_LEN]> {
    hmac_sha256_parts(key, &[data])
}

/// Computes HMAC-SHA256 over the concatenation of `parts`.
///
/// Equivalent to [`hmac_sha256`] on the joined input without building
/// the intermediate buffer.
pub fn hmac_sha256_parts(key: &[u8], parts: &[&[u8]]) -> Result<[u8; HMAC_SHA256_LEN]> {
    let mut mac = keyed(key)?;
    for part in parts {
        mac.update(part);
    }
    let result = mac.finalize().into_bytes();

    let mut output = [0u8; HMAC_SHA256_LEN];
    output.copy_from_slice(&result);
    Ok(output)
}

/// Verifies an HMAC-SHA256 tag over the concatenation of `parts` in
/// constant time.
///
/// `expected` of any length other than 32 bytes fails verification.
///
/// # Errors
///
/// Returns [`WhisperError::AuthenticationFailure`] if the computed tag
/// does not match `expected`.
pub fn verify_hmac_sha256_parts(key: &[u8], parts: &[&[u8]], expected: &[u8]) -> Result<()> {
    let mut mac = keyed(key)?;
    for part in parts {
        mac.update(part);
    }

    mac.verify_slice(expected)
        .map_err(|_| WhisperError::AuthenticationFailure {
            reason: "HMAC-SHA256 tag mismatch (possible tampering)".into(),
        })
}

/// Verifies an HMAC-SHA256 tag over `data` in constant time.
pub fn verify_hmac_sha256(key: &[u8], data: &[u8], expected: &[u8]) -> Result<()> {
    verify_hmac_sha256_parts(key, &[data], expected)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
