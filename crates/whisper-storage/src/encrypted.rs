//! Encrypt-at-rest wrapper for any [`StorageBackend`].
//!
//! Session records contain every ratchet secret, so values are sealed
//! before they reach the inner backend:
//!
//! ```text
//! [nonce 12B] [ciphertext variable] [hmac 32B]
//! ```
//!
//! The ChaCha20-Poly1305 AAD and the HMAC both cover the storage key,
//! so a value copied under another key fails to open. On read the HMAC
//! is verified **before** any decryption attempt.

use rand::rngs::OsRng;
use rand::RngCore;
use whisper_crypto::aead::{decrypt_chacha20, encrypt_chacha20, NONCE_LEN, TAG_LEN};
use whisper_crypto::hkdf::hkdf_sha256;
use whisper_crypto::mac::{hmac_sha256_parts, verify_hmac_sha256_parts, HMAC_SHA256_LEN};
use whisper_types::{Result, WhisperError};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::backend::StorageBackend;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Required master key length in bytes.
const KEY_LEN: usize = 32;

const HKDF_SALT: &[u8] = b"Whisper-SessionStore";
const HKDF_INFO_ENC: &[u8] = b"encryption";
const HKDF_INFO_HMAC: &[u8] = b"hmac";

/// Minimum stored value size: nonce + AEAD tag + HMAC.
const MIN_VALUE_LEN: usize = NONCE_LEN + TAG_LEN + HMAC_SHA256_LEN;

// ---------------------------------------------------------------------------
// StoreKeys
// ---------------------------------------------------------------------------

/// Domain-separated keys derived from the master key.
#[derive(Zeroize, ZeroizeOnDrop)]
struct StoreKeys {
    enc_key: [u8; 32],
    hmac_key: [u8; 32],
}

impl StoreKeys {
    fn derive(master_key: &[u8]) -> Result<Self> {
        let enc = hkdf_sha256(master_key, HKDF_SALT, HKDF_INFO_ENC, 32)?;
        let mac = hkdf_sha256(master_key, HKDF_SALT, HKDF_INFO_HMAC, 32)?;
        Ok(Self {
            enc_key: enc.array_at(0)?,
            hmac_key: mac.array_at(0)?,
        })
    }
}

// ---------------------------------------------------------------------------
// EncryptedBackend
// ---------------------------------------------------------------------------

/// Seals every value written to the inner backend. Keys are stored in
/// clear so prefix listing keeps working.
pub struct EncryptedBackend<B> {
    inner: B,
    keys: StoreKeys,
}

impl<B: StorageBackend> EncryptedBackend<B> {
    /// Wraps `inner` using a 32-byte master key.
    ///
    /// # Errors
    ///
    /// [`WhisperError::ConfigError`] if `master_key` is not 32 bytes.
    pub fn new(inner: B, master_key: &[u8]) -> Result<Self> {
        if master_key.len() != KEY_LEN {
            return Err(WhisperError::ConfigError {
                reason: format!(
                    "storage master key must be {KEY_LEN} bytes, got {}",
                    master_key.len()
                ),
            });
        }
        Ok(Self {
            inner,
            keys: StoreKeys::derive(master_key)?,
        })
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn seal(&self, key: &[u8], value: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = encrypt_chacha20(&self.keys.enc_key, &nonce, value, key)?;
        let tag = hmac_sha256_parts(&self.keys.hmac_key, &[key, &nonce, &ciphertext])?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len() + HMAC_SHA256_LEN);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        out.extend_from_slice(&tag);
        Ok(out)
    }

    fn open(&self, key: &[u8], raw: &[u8]) -> Result<Vec<u8>> {
        if raw.len() < MIN_VALUE_LEN {
            return Err(WhisperError::StorageError {
                reason: format!(
                    "stored value too short: expected at least {MIN_VALUE_LEN} bytes, got {}",
                    raw.len()
                ),
            });
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&raw[..NONCE_LEN]);
        let hmac_start = raw.len() - HMAC_SHA256_LEN;
        let ciphertext = &raw[NONCE_LEN..hmac_start];

        verify_hmac_sha256_parts(
            &self.keys.hmac_key,
            &[key, &nonce, ciphertext],
            &raw[hmac_start..],
        )
        .map_err(|_| WhisperError::StorageError {
            reason: "HMAC verification failed: stored value may be tampered".into(),
        })?;

        decrypt_chacha20(&self.keys.enc_key, &nonce, ciphertext, key).map_err(|_| {
            WhisperError::StorageError {
                reason: "stored value failed to decrypt".into(),
            }
        })
    }
}

impl<B: StorageBackend> StorageBackend for EncryptedBackend<B> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.inner.get(key)? {
            Some(raw) => Ok(Some(self.open(key, &raw)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let sealed = self.seal(key, value)?;
        self.inner.put(key, &sealed)
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        self.inner.delete(key)
    }

    fn list(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.inner.list(prefix)
    }
}
