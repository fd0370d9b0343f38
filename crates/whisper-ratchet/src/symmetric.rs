//! Symmetric-key ratchet: one chain per direction.

use whisper_types::{Result, WhisperError};

use crate::kdf::{kdf_chain_key, ChainKey, MessageKey};

/// A chain key plus the number of the next message it will produce.
///
/// Every call to [`ratchet_forward`](Self::ratchet_forward) replaces
/// the chain key, so earlier message keys cannot be recomputed from
/// the current state.
#[derive(Clone)]
pub struct SymmetricRatchet {
    chain_key: ChainKey,
    message_number: u32,
}

/// Output of one chain step.
pub struct ChainStep {
    pub message_key: MessageKey,
    /// Counter value the key belongs to (pre-increment).
    pub message_number: u32,
}

impl SymmetricRatchet {
    /// Starts a fresh chain at message number 0.
    pub fn new(chain_key: ChainKey) -> Self {
        Self {
            chain_key,
            message_number: 0,
        }
    }

    /// Restores a chain from persisted parts.
    pub fn from_parts(chain_key: ChainKey, message_number: u32) -> Self {
        Self {
            chain_key,
            message_number,
        }
    }

    /// Current chain key.
    pub fn chain_key(&self) -> &ChainKey {
        &self.chain_key
    }

    /// Number the next derived message key will carry.
    pub fn message_number(&self) -> u32 {
        self.message_number
    }

    /// Derives the next message key and advances the chain.
    ///
    /// # Errors
    ///
    /// [`WhisperError::PreconditionViolation`] once the counter would
    /// overflow `u32`; the chain is left untouched.
    pub fn ratchet_forward(&mut self) -> Result<ChainStep> {
        let next_number =
            self.message_number
                .checked_add(1)
                .ok_or_else(|| WhisperError::PreconditionViolation {
                    reason: "chain message counter exhausted".into(),
                })?;
        let (next_chain_key, message_key) = kdf_chain_key(&self.chain_key)?;
        let step = ChainStep {
            message_key,
            message_number: self.message_number,
        };
        self.chain_key = next_chain_key;
        self.message_number = next_number;
        Ok(step)
    }
}
