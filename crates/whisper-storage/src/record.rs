//! Persisted session record and the peer-pair key.

use serde::{Deserialize, Serialize};
use whisper_ratchet::state::SessionState;
use whisper_types::{Result, WhisperError};

/// Current record format version.
pub const SESSION_RECORD_VERSION: u32 = 1;

/// Separator between the two identities of a peer-pair key.
pub const PEER_PAIR_SEPARATOR: &str = "__";

/// Order-independent key for the session between two identities.
///
/// Both parties derive the same key regardless of who initiated.
pub fn peer_pair_key(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{first}{PEER_PAIR_SEPARATOR}{second}")
}

/// Everything persisted for one session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionRecord {
    pub version: u32,
    pub local_identity: String,
    pub remote_identity: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Initiator's X3DH ephemeral public key, attached to outbound
    /// messages until the peer's first message is decrypted.
    pub initial_ephemeral_key: Option<[u8; 32]>,
    pub state: SessionState,
}

impl SessionRecord {
    pub fn new(
        local_identity: &str,
        remote_identity: &str,
        initial_ephemeral_key: Option<[u8; 32]>,
        state: SessionState,
    ) -> Self {
        Self {
            version: SESSION_RECORD_VERSION,
            local_identity: local_identity.to_string(),
            remote_identity: remote_identity.to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
            initial_ephemeral_key,
            state,
        }
    }

    pub fn peer_pair_key(&self) -> String {
        peer_pair_key(&self.local_identity, &self.remote_identity)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| WhisperError::ProtocolError {
            reason: format!("failed to serialize session record: {e}"),
        })
    }

    /// Parses and validates a stored record.
    ///
    /// # Errors
    ///
    /// [`WhisperError::ProtocolError`] on malformed JSON, an unknown
    /// record version or an inconsistent session state.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let record: Self = serde_json::from_slice(bytes).map_err(|e| WhisperError::ProtocolError {
            reason: format!("malformed session record: {e}"),
        })?;
        if record.version != SESSION_RECORD_VERSION {
            return Err(WhisperError::ProtocolError {
                reason: format!(
                    "unsupported session record version {}, expected {SESSION_RECORD_VERSION}",
                    record.version
                ),
            });
        }
        record.state.validate()?;
        Ok(record)
    }
}
