//! Versioned, serializable snapshot of a [`DoubleRatchetSession`].
//!
//! The JSON form uses camelCase field names and raw key bytes. A
//! snapshot holds every secret of the session, so it zeroizes on drop
//! and must be stored with the same care as the keys themselves.

use serde::{Deserialize, Serialize};
use whisper_crypto::ecdh::{X25519KeyPair, X25519PublicKey};
use whisper_types::{RatchetConfig, Result, WhisperError};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::dh::DhRatchet;
use crate::kdf::{ChainKey, MessageKey, RootKey};
use crate::session::DoubleRatchetSession;
use crate::skipped::SkippedKeys;
use crate::symmetric::SymmetricRatchet;

/// Current snapshot format version.
pub const SESSION_STATE_VERSION: u32 = 1;

/// Complete session snapshot.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionState {
    pub version: u32,
    pub dh_ratchet: DhRatchetState,
    pub sending_chain: Option<ChainState>,
    pub receiving_chain: Option<ChainState>,
    pub current_public_key: Option<[u8; 32]>,
    pub previous_chain_length: u32,
    pub skipped_message_keys: Vec<SkippedKeyState>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DhRatchetState {
    pub root_key: [u8; 32],
    pub local_public_key: [u8; 32],
    pub local_secret_key: [u8; 32],
    pub remote_public_key: Option<[u8; 32]>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChainState {
    pub chain_key: [u8; 32],
    pub message_number: u32,
}

/// One cached skipped message key, oldest first in
/// [`SessionState::skipped_message_keys`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SkippedKeyState {
    pub dh_public_key: [u8; 32],
    pub message_number: u32,
    pub message_key: [u8; 32],
}

impl SessionState {
    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// [`WhisperError::ProtocolError`] on an unknown version, a local
    /// public key that does not match the secret, or chains that
    /// cannot coexist.
    pub fn validate(&self) -> Result<()> {
        if self.version != SESSION_STATE_VERSION {
            return Err(WhisperError::ProtocolError {
                reason: format!(
                    "unsupported session state version {}, expected {SESSION_STATE_VERSION}",
                    self.version
                ),
            });
        }

        let derived = X25519KeyPair::from_secret_bytes(self.dh_ratchet.local_secret_key).public_key();
        if derived.as_bytes() != &self.dh_ratchet.local_public_key {
            return Err(WhisperError::ProtocolError {
                reason: "local public key does not match local secret key".into(),
            });
        }

        if let Some(current) = &self.current_public_key {
            if current != &self.dh_ratchet.local_public_key {
                return Err(WhisperError::ProtocolError {
                    reason: "current public key does not match local key pair".into(),
                });
            }
        }

        if self.sending_chain.is_some() && self.current_public_key.is_none() {
            return Err(WhisperError::ProtocolError {
                reason: "sending chain without a current public key".into(),
            });
        }

        if self.dh_ratchet.remote_public_key.is_none()
            && (self.sending_chain.is_some() || self.receiving_chain.is_some())
        {
            return Err(WhisperError::ProtocolError {
                reason: "chain present without a remote public key".into(),
            });
        }

        Ok(())
    }

    /// Serializes to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| WhisperError::ProtocolError {
            reason: format!("failed to serialize session state: {e}"),
        })
    }

    /// Parses and validates JSON produced by [`to_json`](Self::to_json).
    pub fn from_json(json: &str) -> Result<Self> {
        let state: Self = serde_json::from_str(json).map_err(|e| WhisperError::ProtocolError {
            reason: format!("malformed session state: {e}"),
        })?;
        state.validate()?;
        Ok(state)
    }
}

fn chain_state(chain: &SymmetricRatchet) -> ChainState {
    ChainState {
        chain_key: *chain.chain_key().as_bytes(),
        message_number: chain.message_number(),
    }
}

fn chain_from_state(state: &ChainState) -> SymmetricRatchet {
    SymmetricRatchet::from_parts(ChainKey::from_bytes(state.chain_key), state.message_number)
}

impl DoubleRatchetSession {
    /// Captures the full session state.
    pub fn to_state(&self) -> SessionState {
        let local = self.dh_ratchet.local_key_pair();
        SessionState {
            version: SESSION_STATE_VERSION,
            dh_ratchet: DhRatchetState {
                root_key: *self.dh_ratchet.root_key().as_bytes(),
                local_public_key: local.public_key().to_bytes(),
                local_secret_key: *local.secret_bytes(),
                remote_public_key: self.dh_ratchet.remote_public_key().map(|k| k.to_bytes()),
            },
            sending_chain: self.sending_chain.as_ref().map(chain_state),
            receiving_chain: self.receiving_chain.as_ref().map(chain_state),
            current_public_key: self.current_public_key.map(|k| k.to_bytes()),
            previous_chain_length: self.previous_chain_length,
            skipped_message_keys: self
                .skipped
                .iter()
                .map(|(dh, n, key)| SkippedKeyState {
                    dh_public_key: *dh,
                    message_number: n,
                    message_key: *key.as_bytes(),
                })
                .collect(),
        }
    }

    /// Restores a session from a snapshot.
    ///
    /// Continues exactly where [`to_state`](Self::to_state) left off:
    /// no DH step or chain advance happens here.
    pub fn from_state(state: &SessionState, config: RatchetConfig) -> Result<Self> {
        config.validate()?;
        state.validate()?;

        let dh = &state.dh_ratchet;
        let mut skipped = SkippedKeys::new();
        for entry in &state.skipped_message_keys {
            skipped.insert(
                entry.dh_public_key,
                entry.message_number,
                MessageKey::from_bytes(entry.message_key),
            );
        }

        Ok(Self {
            dh_ratchet: DhRatchet::new(
                RootKey::from_bytes(dh.root_key),
                X25519KeyPair::from_secret_bytes(dh.local_secret_key),
                dh.remote_public_key.map(X25519PublicKey::from_bytes),
            ),
            sending_chain: state.sending_chain.as_ref().map(chain_from_state),
            receiving_chain: state.receiving_chain.as_ref().map(chain_from_state),
            current_public_key: state.current_public_key.map(X25519PublicKey::from_bytes),
            previous_chain_length: state.previous_chain_length,
            skipped,
            config,
        })
    }
}
