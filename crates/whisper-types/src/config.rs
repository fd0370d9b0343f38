//! Ratchet and session-store configuration with sensible defaults.

use serde::{Deserialize, Serialize};

use crate::{Result, WhisperError};

/// Upper bound accepted for [`RatchetConfig::max_skip`].
///
/// Deriving a message key is two HMAC calls; beyond this a single
/// header could stall the receiver.
pub const MAX_SKIP_LIMIT: u32 = 100_000;

/// Operational limits for Double Ratchet sessions.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RatchetConfig {
    /// Maximum number of message keys one incoming header may force the
    /// receiver to derive and cache.
    pub max_skip: u32,

    /// Number of skipped message keys the session store retains per
    /// session. Oldest entries are discarded first on save.
    pub max_skipped_keys: usize,

    /// Largest plaintext accepted by `encrypt`, in bytes.
    pub max_plaintext_len: usize,
}

impl Default for RatchetConfig {
    fn default() -> Self {
        Self {
            max_skip: 1000,
            max_skipped_keys: 100,
            max_plaintext_len: 1024 * 1024,
        }
    }
}

impl RatchetConfig {
    /// Validates all configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.max_skip == 0 {
            return Err(WhisperError::ConfigError {
                reason: "max_skip must be greater than 0".into(),
            });
        }

        if self.max_skip > MAX_SKIP_LIMIT {
            return Err(WhisperError::ConfigError {
                reason: format!("max_skip must be at most {MAX_SKIP_LIMIT}"),
            });
        }

        if self.max_skipped_keys == 0 {
            return Err(WhisperError::ConfigError {
                reason: "max_skipped_keys must be greater than 0".into(),
            });
        }

        if self.max_plaintext_len == 0 {
            return Err(WhisperError::ConfigError {
                reason: "max_plaintext_len must be greater than 0".into(),
            });
        }

        Ok(())
    }
}
