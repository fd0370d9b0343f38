//! HKDF-SHA256 key derivation (RFC 5869).
//!
//! Extract computes `prk = HMAC(salt, ikm)`; expand iterates
//! `T(i) = HMAC(prk, T(i-1) || info || i)` and truncates the
//! concatenation to the requested length. Root keys, chain keys and
//! message keys are all derived through this function.
//!
//! The output is zeroized on drop.

use hkdf::Hkdf;
use sha2::Sha256;
use whisper_types::{Result, WhisperError};
use zeroize::{Zeroize, ZeroizeOnDrop};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// SHA-256 output length in bytes.
const HASH_LEN: usize = 32;

/// Maximum output length in bytes.
///
/// RFC 5869 allows at most 255 expand iterations, i.e. `255 × 32`.
pub const MAX_OUTPUT_LEN: usize = 255 * HASH_LEN;

// ---------------------------------------------------------------------------
// HkdfOutput
// ---------------------------------------------------------------------------

/// Variable-length key material derived by HKDF-SHA256.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct HkdfOutput {
    bytes: Vec<u8>,
}

impl HkdfOutput {
    /// Returns the derived key material as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the length of the derived key material.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the output is empty (never the case for a
    /// successful derivation).
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Copies `N` bytes starting at `offset` into a fixed array.
    ///
    /// # Errors
    ///
    /// Returns [`WhisperError::CryptoError`] if the requested range
    /// lies outside the derived material.
    pub fn array_at<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        let end = offset.checked_add(N).ok_or_else(|| WhisperError::CryptoError {
            reason: "HKDF output range overflow".into(),
        })?;
        let slice = self.bytes.get(offset..end).ok_or_else(|| WhisperError::CryptoError {
            reason: format!(
                "HKDF output range {offset}..{end} exceeds length {}",
                self.bytes.len()
            ),
        })?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }
}

// HkdfOutput does not implement Clone/Debug to prevent leakage.

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Derives key material from input keying material using HKDF-SHA256.
///
/// # Parameters
///
/// - `ikm`: input keying material (e.g. an X25519 shared secret).
/// - `salt`: salt value. An empty slice selects the RFC 5869 default
///   of 32 zero bytes.
/// - `info`: context string binding the output to its purpose.
/// - `output_len`: desired output length, `1..=MAX_OUTPUT_LEN`.
///
/// # Errors
///
/// [`WhisperError::CryptoError`] if `output_len` is 0 or would need
/// more than 255 expand iterations.
pub fn hkdf_sha256(ikm: &[u8], salt: &[u8], info: &[u8], output_len: usize) -> Result<HkdfOutput> {
    if output_len == 0 {
        return Err(WhisperError::CryptoError {
            reason: "HKDF output length must be at least 1 byte".into(),
        });
    }

    if output_len > MAX_OUTPUT_LEN {
        return Err(WhisperError::CryptoError {
            reason: format!("HKDF output length {output_len} exceeds maximum {MAX_OUTPUT_LEN}"),
        });
    }

    let salt_opt: Option<&[u8]> = if salt.is_empty() { None } else { Some(salt) };
    let hk = Hkdf::<Sha256>::new(salt_opt, ikm);

    let mut okm = vec![0u8; output_len];
    hk.expand(info, &mut okm).map_err(|e| WhisperError::CryptoError {
        reason: format!("HKDF-SHA256 expansion failed: {e}"),
    })?;

    Ok(HkdfOutput { bytes: okm })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
