//! Key derivation for the Double Ratchet.
//!
//! ```text
//! kdf_root_key(rk, dh)   = HKDF(ikm=dh, salt=rk, info="WhisperDoubleRatchetRootKey", 64)
//!                          -> (root key [0..32], chain key [32..64])
//! kdf_chain_key(ck)      = (HMAC(ck, 0x02), HMAC(ck, 0x01))
//!                          -> (next chain key, message key)
//! derive_message_keys(mk)= HKDF(ikm=mk, salt=0^32, info="WhisperMessageKeys", 80)
//!                          -> (enc key [0..32], auth key [32..64], iv [64..80])
//! ```
//!
//! All functions are pure: identical inputs yield identical outputs.
//! Every key type zeroizes itself on drop.

use whisper_crypto::hash::sha256_parts;
use whisper_crypto::hkdf::hkdf_sha256;
use whisper_crypto::mac::hmac_sha256;
use whisper_types::Result;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Length of root, chain and message keys.
pub const KEY_LEN: usize = 32;

/// Length of the payload IV produced by [`derive_message_keys`].
pub const IV_LEN: usize = 16;

const ROOT_KEY_INFO: &[u8] = b"WhisperDoubleRatchetRootKey";
const MESSAGE_KEYS_INFO: &[u8] = b"WhisperMessageKeys";
const FINGERPRINT_LABEL: &[u8] = b"WhisperRootKeyFingerprint";

const MESSAGE_KEY_SEED: [u8; 1] = [0x01];
const CHAIN_KEY_SEED: [u8; 1] = [0x02];

// ---------------------------------------------------------------------------
// Key types
// ---------------------------------------------------------------------------

/// Top-level 32-byte secret shared by both parties after every ratchet
/// step.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RootKey([u8; KEY_LEN]);

impl RootKey {
    /// Wraps raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Public commitment to this root key, suitable for comparing the
    /// two parties' agreement out of band.
    pub fn fingerprint(&self) -> [u8; 32] {
        sha256_parts(&[FINGERPRINT_LABEL, &self.0])
    }
}

/// Per-direction chain secret, advanced once per message.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ChainKey([u8; KEY_LEN]);

impl ChainKey {
    /// Wraps raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Single-use key for one message.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MessageKey([u8; KEY_LEN]);

impl MessageKey {
    /// Wraps raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

// Key types do not implement Debug to prevent leakage.

/// Expanded key material for one message.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MessageKeys {
    /// Payload cipher key.
    pub enc_key: [u8; 32],
    /// HMAC key for the message MAC.
    pub auth_key: [u8; 32],
    /// Payload IV.
    pub iv: [u8; IV_LEN],
}

impl MessageKeys {
    /// The 96-bit ChaCha20-Poly1305 nonce: the first 12 bytes of the IV.
    pub fn nonce(&self) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&self.iv[..12]);
        nonce
    }
}

// ---------------------------------------------------------------------------
// Derivations
// ---------------------------------------------------------------------------

/// Mixes a DH output into the root key, producing the next root key and
/// a fresh chain key.
pub fn kdf_root_key(root_key: &RootKey, dh_output: &[u8]) -> Result<(RootKey, ChainKey)> {
    let okm = hkdf_sha256(dh_output, root_key.as_bytes(), ROOT_KEY_INFO, 2 * KEY_LEN)?;
    let root: [u8; KEY_LEN] = okm.array_at(0)?;
    let chain: [u8; KEY_LEN] = okm.array_at(KEY_LEN)?;
    Ok((RootKey(root), ChainKey(chain)))
}

/// Advances a chain key one step.
///
/// Returns `(next_chain_key, message_key)`. HMAC is one-way, so the
/// next chain key reveals nothing about `chain_key`.
pub fn kdf_chain_key(chain_key: &ChainKey) -> Result<(ChainKey, MessageKey)> {
    let next = hmac_sha256(chain_key.as_bytes(), &CHAIN_KEY_SEED)?;
    let message = hmac_sha256(chain_key.as_bytes(), &MESSAGE_KEY_SEED)?;
    Ok((ChainKey(next), MessageKey(message)))
}

/// Expands a message key into cipher key, MAC key and IV.
pub fn derive_message_keys(message_key: &MessageKey) -> Result<MessageKeys> {
    let okm = hkdf_sha256(
        message_key.as_bytes(),
        &[0u8; KEY_LEN],
        MESSAGE_KEYS_INFO,
        2 * KEY_LEN + IV_LEN,
    )?;
    Ok(MessageKeys {
        enc_key: okm.array_at(0)?,
        auth_key: okm.array_at(KEY_LEN)?,
        iv: okm.array_at(2 * KEY_LEN)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
