//! Per-peer-pair session manager.
//!
//! Every encrypt or decrypt is a load, mutate, persist cycle. Two such
//! cycles on the same session must never interleave, otherwise both
//! would start from the same chain state and reuse a message key. The
//! manager therefore holds a mutex per peer-pair key for the whole
//! cycle. Different pairs proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};
use whisper_crypto::ecdh::{X25519KeyPair, X25519PublicKey};
use whisper_ratchet::x3dh::{initiator_key_agreement, responder_key_agreement};
use whisper_ratchet::{DoubleRatchetSession, RatchetMessage};
use whisper_types::{RatchetConfig, Result, WhisperError};

use crate::backend::StorageBackend;
use crate::record::{peer_pair_key, SessionRecord};
use crate::store::{SessionStore, SessionSummary};

/// Identities on both ends of a session.
pub struct PeerContext<'a> {
    pub local_name: &'a str,
    pub remote_name: &'a str,
    pub local_identity: &'a X25519KeyPair,
    pub remote_identity: &'a X25519PublicKey,
}

/// Result of [`SessionManager::encrypt_for`].
#[derive(Clone, Debug)]
pub struct OutboundMessage {
    pub message: RatchetMessage,
    /// Present until the peer has answered; must travel with the
    /// message so the peer can bootstrap its side of the session.
    pub initial_ephemeral_key: Option<X25519PublicKey>,
}

/// Serializes session access per peer pair.
pub struct SessionManager<B> {
    store: SessionStore<B>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

fn poisoned() -> WhisperError {
    WhisperError::StorageError {
        reason: "session lock poisoned".into(),
    }
}

impl<B: StorageBackend> SessionManager<B> {
    pub fn new(store: SessionStore<B>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &SessionStore<B> {
        &self.store
    }

    fn lock_for(&self, session_key: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| poisoned())?;
        Ok(Arc::clone(locks.entry(session_key.to_string()).or_default()))
    }

    /// Encrypts `plaintext` for the remote peer, creating the initiator
    /// session on first contact.
    pub fn encrypt_for(
        &self,
        peers: &PeerContext<'_>,
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<OutboundMessage> {
        let session_key = peer_pair_key(peers.local_name, peers.remote_name);
        let lock = self.lock_for(&session_key)?;
        let _guard = lock.lock().map_err(|_| poisoned())?;

        let config = self.store.config().clone();
        let loaded = self.store.load(peers.local_name, peers.remote_name)?;
        let (mut record, mut session) = match loaded {
            Some(record) => {
                let session = DoubleRatchetSession::from_state(&record.state, config)?;
                (record, session)
            }
            None => {
                let agreement =
                    initiator_key_agreement(peers.local_identity, peers.remote_identity)?;
                let ephemeral_public = agreement.ephemeral_public_key.to_bytes();
                let session = DoubleRatchetSession::with_config(
                    agreement.root_key,
                    agreement.ephemeral_key_pair,
                    *peers.remote_identity,
                    true,
                    config,
                )?;
                info!(session = %session_key, "initiator session created");
                let record = SessionRecord::new(
                    peers.local_name,
                    peers.remote_name,
                    Some(ephemeral_public),
                    session.to_state(),
                );
                (record, session)
            }
        };

        let message = session.encrypt(plaintext, associated_data)?;
        record.state = session.to_state();
        self.store.save(&mut record)?;

        debug!(
            session = %session_key,
            message_number = message.header.message_number,
            "outbound message persisted"
        );
        Ok(OutboundMessage {
            message,
            initial_ephemeral_key: record.initial_ephemeral_key.map(X25519PublicKey::from_bytes),
        })
    }

    /// Decrypts a message from the remote peer, creating the responder
    /// session on first contact.
    ///
    /// Nothing is persisted unless decryption succeeds.
    ///
    /// If both sides sent a first message before either answered, the
    /// identity that sorts higher drops its unanswered initiator session
    /// and becomes the responder. Its earlier messages cannot be read by
    /// the peer.
    ///
    /// # Errors
    ///
    /// [`WhisperError::PreconditionViolation`] if no session exists and
    /// `initial_ephemeral_key` is absent, plus any decrypt error.
    pub fn decrypt_from(
        &self,
        peers: &PeerContext<'_>,
        initial_ephemeral_key: Option<&X25519PublicKey>,
        message: &RatchetMessage,
        associated_data: &[u8],
    ) -> Result<Vec<u8>> {
        let session_key = peer_pair_key(peers.local_name, peers.remote_name);
        let lock = self.lock_for(&session_key)?;
        let _guard = lock.lock().map_err(|_| poisoned())?;

        let config = self.store.config().clone();
        let loaded = self.store.load(peers.local_name, peers.remote_name)?;
        let (mut record, mut session, created) = match loaded {
            Some(record) if yields_initiator_role(peers, &record, initial_ephemeral_key) => {
                info!(
                    session = %session_key,
                    "simultaneous first contact, rebuilding as responder"
                );
                let (record, session) = bootstrap_responder(peers, initial_ephemeral_key, config)?;
                (record, session, true)
            }
            Some(record) => {
                let session = DoubleRatchetSession::from_state(&record.state, config)?;
                (record, session, false)
            }
            None => {
                let (record, session) = bootstrap_responder(peers, initial_ephemeral_key, config)?;
                (record, session, true)
            }
        };

        let plaintext = session.decrypt(message, associated_data)?;
        if record.initial_ephemeral_key.take().is_some() {
            debug!(session = %session_key, "peer answered, initial ephemeral key dropped");
        }
        record.state = session.to_state();
        self.store.save(&mut record)?;
        if created {
            info!(session = %session_key, "responder session established");
        }
        Ok(plaintext)
    }

    /// Deletes the session with the remote peer and releases its lock
    /// entry once no other call holds it.
    pub fn delete_session(&self, local_name: &str, remote_name: &str) -> Result<bool> {
        let session_key = peer_pair_key(local_name, remote_name);
        let lock = self.lock_for(&session_key)?;
        let deleted = {
            let _guard = lock.lock().map_err(|_| poisoned())?;
            self.store.delete(local_name, remote_name)?
        };
        drop(lock);

        let mut locks = self.locks.lock().map_err(|_| poisoned())?;
        if locks
            .get(&session_key)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(&session_key);
        }
        Ok(deleted)
    }

    /// Number of peer pairs with a live lock entry.
    pub fn tracked_locks(&self) -> Result<usize> {
        Ok(self.locks.lock().map_err(|_| poisoned())?.len())
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.store.list()
    }
}

// ---------------------------------------------------------------------------
// First contact
// ---------------------------------------------------------------------------

/// True when both sides initiated and this side must give way.
///
/// The stored record is an initiator session the peer never answered and
/// the inbound message carries the peer's own bootstrap key. The identity
/// that sorts lower keeps the initiator role.
fn yields_initiator_role(
    peers: &PeerContext<'_>,
    record: &SessionRecord,
    initial_ephemeral_key: Option<&X25519PublicKey>,
) -> bool {
    record.initial_ephemeral_key.is_some()
        && initial_ephemeral_key.is_some()
        && peers.local_name > peers.remote_name
}

fn bootstrap_responder(
    peers: &PeerContext<'_>,
    initial_ephemeral_key: Option<&X25519PublicKey>,
    config: RatchetConfig,
) -> Result<(SessionRecord, DoubleRatchetSession)> {
    let ephemeral = initial_ephemeral_key.ok_or_else(|| WhisperError::PreconditionViolation {
        reason: format!(
            "no session with {} and no initial ephemeral key supplied",
            peers.remote_name
        ),
    })?;
    let root_key = responder_key_agreement(peers.local_identity, peers.remote_identity, ephemeral)?;
    let session = DoubleRatchetSession::with_config(
        root_key,
        peers.local_identity.clone(),
        *peers.remote_identity,
        false,
        config,
    )?;
    let record = SessionRecord::new(peers.local_name, peers.remote_name, None, session.to_state());
    Ok((record, session))
}
