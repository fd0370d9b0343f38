//! Diffie-Hellman ratchet.
//!
//! Holds the root key, our current X25519 key pair and the peer's most
//! recent ratchet public key. Each step mixes a fresh DH output into
//! the root key and yields a new chain key.

use tracing::debug;
use whisper_crypto::ecdh::{X25519KeyPair, X25519PublicKey};
use whisper_types::{Result, WhisperError};

use crate::kdf::{kdf_root_key, ChainKey, RootKey};

/// Asymmetric ratchet state.
///
/// Does not implement Debug to prevent leakage.
#[derive(Clone)]
pub struct DhRatchet {
    root_key: RootKey,
    local_key_pair: X25519KeyPair,
    remote_public_key: Option<X25519PublicKey>,
}

/// Output of a sending step: the new chain key and the public key the
/// peer must see in our headers.
pub struct SendingStep {
    pub chain_key: ChainKey,
    pub public_key: X25519PublicKey,
}

impl DhRatchet {
    pub fn new(
        root_key: RootKey,
        local_key_pair: X25519KeyPair,
        remote_public_key: Option<X25519PublicKey>,
    ) -> Self {
        Self {
            root_key,
            local_key_pair,
            remote_public_key,
        }
    }

    pub fn root_key(&self) -> &RootKey {
        &self.root_key
    }

    pub fn local_key_pair(&self) -> &X25519KeyPair {
        &self.local_key_pair
    }

    pub fn remote_public_key(&self) -> Option<X25519PublicKey> {
        self.remote_public_key
    }

    /// Adopts `remote_public_key` and derives the receiving chain key
    /// from `DH(local, remote)`.
    ///
    /// The local key pair is not rotated. On error nothing changes.
    ///
    /// # Errors
    ///
    /// [`WhisperError::CryptoError`] if the remote key is a low-order
    /// point.
    pub fn ratchet_receive(&mut self, remote_public_key: X25519PublicKey) -> Result<ChainKey> {
        let shared = self.local_key_pair.diffie_hellman(&remote_public_key)?;
        let (root_key, chain_key) = kdf_root_key(&self.root_key, shared.as_bytes())?;
        self.root_key = root_key;
        self.remote_public_key = Some(remote_public_key);
        debug!("dh ratchet: receiving step");
        Ok(chain_key)
    }

    /// Rotates to a freshly generated key pair and derives the sending
    /// chain key from `DH(new local, remote)`.
    ///
    /// # Errors
    ///
    /// [`WhisperError::PreconditionViolation`] if no remote key is known.
    pub fn ratchet_send(&mut self) -> Result<SendingStep> {
        self.ratchet_send_with(X25519KeyPair::generate())
    }

    /// [`ratchet_send`](Self::ratchet_send) with a caller-supplied key
    /// pair.
    pub fn ratchet_send_with(&mut self, key_pair: X25519KeyPair) -> Result<SendingStep> {
        let remote = self
            .remote_public_key
            .ok_or_else(|| WhisperError::PreconditionViolation {
                reason: "sending ratchet step without a remote public key".into(),
            })?;
        let shared = key_pair.diffie_hellman(&remote)?;
        let (root_key, chain_key) = kdf_root_key(&self.root_key, shared.as_bytes())?;
        let public_key = key_pair.public_key();
        self.root_key = root_key;
        self.local_key_pair = key_pair;
        debug!("dh ratchet: sending step");
        Ok(SendingStep {
            chain_key,
            public_key,
        })
    }
}
