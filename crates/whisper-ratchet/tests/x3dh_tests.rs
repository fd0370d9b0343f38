//! X3DH-lite agreement: both roles must derive byte-identical root keys.

use whisper_crypto::ecdh::X25519KeyPair;
use whisper_ratchet::x3dh::{
    confirm_agreement, initiator_key_agreement, initiator_key_agreement_with,
    responder_key_agreement,
};
use whisper_types::WhisperError;

#[test]
fn fixed_seed_agreement_is_symmetric() -> std::result::Result<(), WhisperError> {
    let alice = X25519KeyPair::from_secret_bytes([0x0A; 32]);
    let bob = X25519KeyPair::from_secret_bytes([0x0B; 32]);
    let ephemeral = X25519KeyPair::from_secret_bytes([0x0E; 32]);
    let ephemeral_public = ephemeral.public_key();

    let init = initiator_key_agreement_with(&alice, &bob.public_key(), ephemeral)?;
    let resp = responder_key_agreement(&bob, &alice.public_key(), &ephemeral_public)?;

    assert_eq!(init.ephemeral_public_key, ephemeral_public);
    assert_eq!(init.root_key.as_bytes(), resp.as_bytes());

    // Same seeds, same root.
    let again = initiator_key_agreement_with(
        &alice,
        &bob.public_key(),
        X25519KeyPair::from_secret_bytes([0x0E; 32]),
    )?;
    assert_eq!(again.root_key.as_bytes(), init.root_key.as_bytes());
    Ok(())
}

#[test]
fn random_identities_agree() -> std::result::Result<(), WhisperError> {
    for _ in 0..16 {
        let alice = X25519KeyPair::generate();
        let bob = X25519KeyPair::generate();
        let init = initiator_key_agreement(&alice, &bob.public_key())?;
        let resp = responder_key_agreement(&bob, &alice.public_key(), &init.ephemeral_public_key)?;
        assert_eq!(init.root_key.as_bytes(), resp.as_bytes());
        confirm_agreement(&init.root_key, &resp.fingerprint())?;
    }
    Ok(())
}

#[test]
fn swapped_roles_do_not_agree() -> std::result::Result<(), WhisperError> {
    let alice = X25519KeyPair::from_secret_bytes([0x0A; 32]);
    let bob = X25519KeyPair::from_secret_bytes([0x0B; 32]);
    let init = initiator_key_agreement(&alice, &bob.public_key())?;
    // Responder mistakenly uses the initiator's identity as its own.
    let wrong = responder_key_agreement(&alice, &bob.public_key(), &init.ephemeral_public_key)?;
    assert!(matches!(
        confirm_agreement(&wrong, &init.root_key.fingerprint()),
        Err(WhisperError::KeyAgreementMismatch { .. })
    ));
    Ok(())
}
