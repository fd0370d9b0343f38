//! Keyed session store over a [`StorageBackend`].

use tracing::{debug, info, warn};
use whisper_types::{RatchetConfig, Result, WhisperError};

use crate::backend::StorageBackend;
use crate::record::{peer_pair_key, SessionRecord};

/// Key prefix for session records.
const SESSION_PREFIX: &str = "session/";

fn storage_key(local_identity: &str, remote_identity: &str) -> Vec<u8> {
    format!("{SESSION_PREFIX}{}", peer_pair_key(local_identity, remote_identity)).into_bytes()
}

/// Listing entry returned by [`SessionStore::list`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_key: String,
    pub local_identity: String,
    pub remote_identity: String,
    pub created_at: i64,
}

/// Persists one [`SessionRecord`] per peer pair.
///
/// Not synchronized on its own; [`SessionManager`](crate::SessionManager)
/// provides per-pair mutual exclusion.
pub struct SessionStore<B> {
    backend: B,
    config: RatchetConfig,
}

impl<B: StorageBackend> SessionStore<B> {
    /// # Errors
    ///
    /// [`WhisperError::ConfigError`] if `config` is invalid.
    pub fn new(backend: B, config: RatchetConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { backend, config })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &RatchetConfig {
        &self.config
    }

    /// Loads the record for the pair, if one exists.
    ///
    /// # Errors
    ///
    /// - [`WhisperError::ProtocolError`] if the stored record is invalid.
    /// - [`WhisperError::StorageError`] if it belongs to a different
    ///   local identity.
    pub fn load(&self, local_identity: &str, remote_identity: &str) -> Result<Option<SessionRecord>> {
        let Some(bytes) = self.backend.get(&storage_key(local_identity, remote_identity))? else {
            return Ok(None);
        };
        let record = SessionRecord::from_bytes(&bytes)?;
        if record.local_identity != local_identity || record.remote_identity != remote_identity {
            return Err(WhisperError::StorageError {
                reason: format!(
                    "stored session belongs to {} -> {}",
                    record.local_identity, record.remote_identity
                ),
            });
        }
        Ok(Some(record))
    }

    /// Persists `record`, first discarding the oldest skipped message
    /// keys beyond the configured cap. The pruning is applied to
    /// `record` itself so the caller's copy matches what was stored.
    pub fn save(&self, record: &mut SessionRecord) -> Result<()> {
        let cap = self.config.max_skipped_keys;
        let skipped = &mut record.state.skipped_message_keys;
        if skipped.len() > cap {
            let excess = skipped.len() - cap;
            skipped.drain(..excess);
            warn!(
                discarded = excess,
                session = %record.peer_pair_key(),
                "pruned skipped message keys on save"
            );
        }
        let key = storage_key(&record.local_identity, &record.remote_identity);
        self.backend.put(&key, &record.to_bytes()?)?;
        debug!(session = %record.peer_pair_key(), "session saved");
        Ok(())
    }

    /// Removes the pair's record. Returns `true` if it existed.
    pub fn delete(&self, local_identity: &str, remote_identity: &str) -> Result<bool> {
        let removed = self
            .backend
            .delete(&storage_key(local_identity, remote_identity))?;
        if removed {
            info!(
                session = %peer_pair_key(local_identity, remote_identity),
                "session deleted"
            );
        }
        Ok(removed)
    }

    /// Summaries of every stored session, ordered by key.
    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut out = Vec::new();
        for key in self.backend.list(SESSION_PREFIX.as_bytes())? {
            let Some(bytes) = self.backend.get(&key)? else {
                continue;
            };
            let record = SessionRecord::from_bytes(&bytes)?;
            out.push(SessionSummary {
                session_key: record.peer_pair_key(),
                local_identity: record.local_identity.clone(),
                remote_identity: record.remote_identity.clone(),
                created_at: record.created_at,
            });
        }
        Ok(out)
    }

    /// Trims the pair's skipped keys to at most `max`, oldest first.
    /// Returns the number discarded.
    pub fn cleanup_skipped_keys(
        &self,
        local_identity: &str,
        remote_identity: &str,
        max: usize,
    ) -> Result<usize> {
        let Some(mut record) = self.load(local_identity, remote_identity)? else {
            return Ok(0);
        };
        let skipped = &mut record.state.skipped_message_keys;
        if skipped.len() <= max {
            return Ok(0);
        }
        let excess = skipped.len() - max;
        skipped.drain(..excess);
        self.save(&mut record)?;
        info!(
            discarded = excess,
            session = %record.peer_pair_key(),
            "skipped message keys cleaned up"
        );
        Ok(excess)
    }
}
