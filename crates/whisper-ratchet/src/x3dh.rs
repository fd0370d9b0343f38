//! Simplified X3DH root-key agreement.
//!
//! Only two DH values are used (no signed pre-keys, no one-time
//! pre-keys):
//!
//! ```text
//! initiator: dh1 = DH(IK_A, IK_B)   dh2 = DH(EK_A, IK_B)
//! responder: dh1 = DH(IK_B, IK_A)   dh2 = DH(IK_B, EK_A)
//! root       = SHA-256(dh1 || dh2 || "WhisperX3DHRootKey")
//! ```
//!
//! DH is commutative, so both sides obtain the same root key.

use tracing::debug;
use whisper_crypto::ecdh::{X25519KeyPair, X25519PublicKey};
use whisper_crypto::hash::sha256_parts;
use whisper_types::{Result, WhisperError};

use crate::kdf::RootKey;

const ROOT_KEY_LABEL: &[u8] = b"WhisperX3DHRootKey";

/// Initiator's side of the agreement.
pub struct InitiatorAgreement {
    pub root_key: RootKey,
    /// Seeds the initiator's sending DH ratchet.
    pub ephemeral_key_pair: X25519KeyPair,
    /// Must reach the responder alongside the first message.
    pub ephemeral_public_key: X25519PublicKey,
}

/// Runs the initiator side with a fresh ephemeral key.
pub fn initiator_key_agreement(
    local_identity: &X25519KeyPair,
    remote_identity: &X25519PublicKey,
) -> Result<InitiatorAgreement> {
    initiator_key_agreement_with(local_identity, remote_identity, X25519KeyPair::generate())
}

/// Runs the initiator side with a caller-supplied ephemeral key pair.
pub fn initiator_key_agreement_with(
    local_identity: &X25519KeyPair,
    remote_identity: &X25519PublicKey,
    ephemeral_key_pair: X25519KeyPair,
) -> Result<InitiatorAgreement> {
    let dh1 = local_identity.diffie_hellman(remote_identity)?;
    let dh2 = ephemeral_key_pair.diffie_hellman(remote_identity)?;
    let root_key = RootKey::from_bytes(sha256_parts(&[
        dh1.as_bytes(),
        dh2.as_bytes(),
        ROOT_KEY_LABEL,
    ]));
    let ephemeral_public_key = ephemeral_key_pair.public_key();
    debug!("x3dh: initiator agreement complete");
    Ok(InitiatorAgreement {
        root_key,
        ephemeral_key_pair,
        ephemeral_public_key,
    })
}

/// Runs the responder side using the initiator's ephemeral public key.
pub fn responder_key_agreement(
    local_identity: &X25519KeyPair,
    remote_identity: &X25519PublicKey,
    remote_ephemeral: &X25519PublicKey,
) -> Result<RootKey> {
    let dh1 = local_identity.diffie_hellman(remote_identity)?;
    let dh2 = local_identity.diffie_hellman(remote_ephemeral)?;
    debug!("x3dh: responder agreement complete");
    Ok(RootKey::from_bytes(sha256_parts(&[
        dh1.as_bytes(),
        dh2.as_bytes(),
        ROOT_KEY_LABEL,
    ])))
}

/// Compares our root key against the fingerprint the peer reports.
///
/// # Errors
///
/// [`WhisperError::KeyAgreementMismatch`] if the fingerprints differ.
pub fn confirm_agreement(local_root: &RootKey, peer_fingerprint: &[u8; 32]) -> Result<()> {
    if &local_root.fingerprint() != peer_fingerprint {
        return Err(WhisperError::KeyAgreementMismatch {
            reason: "root key fingerprints differ".into(),
        });
    }
    Ok(())
}
