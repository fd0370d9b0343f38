//! Cross-party Double Ratchet scenarios.
//!
//! Identity keys come from fixed seeds. Ratchet key pairs generated
//! during sending steps come from the OS CSPRNG, so only plaintext
//! equality and error kinds are asserted, never ciphertext bytes.

use whisper_crypto::ecdh::X25519KeyPair;
use whisper_ratchet::header::MessageHeader;
use whisper_ratchet::kdf::RootKey;
use whisper_ratchet::state::SessionState;
use whisper_ratchet::x3dh::{initiator_key_agreement, responder_key_agreement};
use whisper_ratchet::{DoubleRatchetSession, RatchetMessage};
use whisper_types::{RatchetConfig, WhisperError};

type TestResult = std::result::Result<(), WhisperError>;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn alice_identity() -> X25519KeyPair {
    X25519KeyPair::from_secret_bytes([0xA1; 32])
}

fn bob_identity() -> X25519KeyPair {
    X25519KeyPair::from_secret_bytes([0xB2; 32])
}

/// Alice as initiator and Bob as responder over a fixed root key.
fn seeded_pair() -> std::result::Result<(DoubleRatchetSession, DoubleRatchetSession), WhisperError> {
    let root = RootKey::from_bytes([0x01; 32]);
    let alice = DoubleRatchetSession::new(
        root.clone(),
        alice_identity(),
        bob_identity().public_key(),
        true,
    )?;
    let bob = DoubleRatchetSession::new(root, bob_identity(), alice_identity().public_key(), false)?;
    Ok((alice, bob))
}

/// Alice and Bob bootstrapped through the X3DH-lite exchange.
fn agreed_pair() -> std::result::Result<(DoubleRatchetSession, DoubleRatchetSession), WhisperError> {
    let a = alice_identity();
    let b = bob_identity();
    let init = initiator_key_agreement(&a, &b.public_key())?;
    let bob_root = responder_key_agreement(&b, &a.public_key(), &init.ephemeral_public_key)?;
    let alice =
        DoubleRatchetSession::new(init.root_key, init.ephemeral_key_pair, b.public_key(), true)?;
    let bob = DoubleRatchetSession::new(bob_root, b, a.public_key(), false)?;
    Ok((alice, bob))
}

fn restore(session: &DoubleRatchetSession) -> std::result::Result<DoubleRatchetSession, WhisperError> {
    let json = session.to_state().to_json()?;
    DoubleRatchetSession::from_state(&SessionState::from_json(&json)?, RatchetConfig::default())
}

// ---------------------------------------------------------------------------
// 1. Seeded end-to-end exchange
// ---------------------------------------------------------------------------

#[test]
fn seeded_three_message_exchange() -> TestResult {
    let (mut alice, mut bob) = seeded_pair()?;

    let m1 = alice.encrypt(b"Hello Bob!", b"")?;
    assert_eq!(bob.decrypt(&m1, b"")?, b"Hello Bob!");

    let m2 = bob.encrypt(b"Hi Alice!", b"")?;
    assert_eq!(alice.decrypt(&m2, b"")?, b"Hi Alice!");

    let m3 = alice.encrypt(b"How are you?", b"")?;
    assert_eq!(bob.decrypt(&m3, b"")?, b"How are you?");

    assert_eq!(alice.root_fingerprint(), bob.root_fingerprint());
    Ok(())
}

#[test]
fn direction_flip_resets_message_numbers() -> TestResult {
    let (mut alice, mut bob) = seeded_pair()?;
    let m1 = alice.encrypt(b"one", b"")?;
    let m2 = alice.encrypt(b"two", b"")?;
    bob.decrypt(&m1, b"")?;
    bob.decrypt(&m2, b"")?;

    let reply = bob.encrypt(b"back", b"")?;
    assert_eq!(reply.header.message_number, 0);
    assert_eq!(reply.header.previous_chain_length, 2);
    assert_ne!(Some(reply.header.dh_public_key), alice.current_public_key());
    alice.decrypt(&reply, b"")?;

    let m3 = alice.encrypt(b"three", b"")?;
    assert_eq!(m3.header.message_number, 0);
    assert_eq!(m3.header.previous_chain_length, 1);
    assert_eq!(bob.decrypt(&m3, b"")?, b"three");
    Ok(())
}

// ---------------------------------------------------------------------------
// 2. Round trips
// ---------------------------------------------------------------------------

#[test]
fn unidirectional_chain() -> TestResult {
    let (mut alice, mut bob) = agreed_pair()?;
    for i in 0..20u32 {
        let text = format!("message {i}");
        let msg = alice.encrypt(text.as_bytes(), b"")?;
        assert_eq!(msg.header.message_number, i);
        assert_eq!(bob.decrypt(&msg, b"")?, text.as_bytes());
    }
    Ok(())
}

#[test]
fn ping_pong_many_turns() -> TestResult {
    let (mut alice, mut bob) = agreed_pair()?;
    for turn in 0..8 {
        let a = format!("alice turn {turn}");
        let msg = alice.encrypt(a.as_bytes(), b"")?;
        assert_eq!(bob.decrypt(&msg, b"")?, a.as_bytes());

        let b = format!("bob turn {turn}");
        let msg = bob.encrypt(b.as_bytes(), b"")?;
        assert_eq!(alice.decrypt(&msg, b"")?, b.as_bytes());
    }
    Ok(())
}

#[test]
fn uneven_bursts_in_both_directions() -> TestResult {
    let (mut alice, mut bob) = agreed_pair()?;
    for round in 1..=4usize {
        for i in 0..round {
            let msg = alice.encrypt(format!("a{round}-{i}").as_bytes(), b"")?;
            bob.decrypt(&msg, b"")?;
        }
        for i in 0..(5 - round) {
            let msg = bob.encrypt(format!("b{round}-{i}").as_bytes(), b"")?;
            alice.decrypt(&msg, b"")?;
        }
    }
    Ok(())
}

#[test]
fn empty_and_large_payloads() -> TestResult {
    let (mut alice, mut bob) = agreed_pair()?;
    let empty = alice.encrypt(b"", b"")?;
    assert!(bob.decrypt(&empty, b"")?.is_empty());

    let large = vec![0x5Au8; 64 * 1024];
    let msg = alice.encrypt(&large, b"")?;
    assert_eq!(bob.decrypt(&msg, b"")?, large);
    Ok(())
}

// ---------------------------------------------------------------------------
// 3. Tamper detection
// ---------------------------------------------------------------------------

fn expect_auth_failure(bob: &mut DoubleRatchetSession, msg: &RatchetMessage, what: &str) {
    match bob.decrypt(msg, b"ad") {
        Err(WhisperError::AuthenticationFailure { .. }) => {}
        other => panic!("{what}: expected AuthenticationFailure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn flipped_ciphertext_bits_are_rejected() -> TestResult {
    let (mut alice, mut bob) = agreed_pair()?;
    let msg = alice.encrypt(b"attack at dawn", b"ad")?;
    for byte in 0..msg.ciphertext.len() {
        let mut forged = msg.clone();
        forged.ciphertext[byte] ^= 1 << (byte % 8);
        expect_auth_failure(&mut bob, &forged, &format!("ciphertext byte {byte}"));
    }
    assert_eq!(bob.decrypt(&msg, b"ad")?, b"attack at dawn");
    Ok(())
}

#[test]
fn flipped_mac_bits_are_rejected() -> TestResult {
    let (mut alice, mut bob) = agreed_pair()?;
    let msg = alice.encrypt(b"attack at dawn", b"ad")?;
    for bit in (0..256).step_by(5) {
        let mut forged = msg.clone();
        forged.mac[bit / 8] ^= 1 << (bit % 8);
        expect_auth_failure(&mut bob, &forged, &format!("mac bit {bit}"));
    }
    assert_eq!(bob.decrypt(&msg, b"ad")?, b"attack at dawn");
    Ok(())
}

#[test]
fn flipped_header_bits_are_rejected() -> TestResult {
    let (mut alice, mut bob) = agreed_pair()?;
    let msg = alice.encrypt(b"attack at dawn", b"ad")?;
    let original = msg.header.to_bytes();

    // Ratchet key bits, message-number low bits, previous-chain-length bits.
    let key_bits = (0..256).step_by(7);
    let number_bits = (0..10).map(|b| (35 - b / 8) * 8 + b % 8);
    let previous_bits = (0..32).map(|b| (39 - b / 8) * 8 + b % 8);

    for bit in key_bits.chain(number_bits).chain(previous_bits) {
        let mut bytes = original;
        bytes[bit / 8] ^= 1 << (bit % 8);
        let mut forged = msg.clone();
        forged.header = MessageHeader::from_bytes(&bytes)?;
        expect_auth_failure(&mut bob, &forged, &format!("header bit {bit}"));
    }
    assert_eq!(bob.decrypt(&msg, b"ad")?, b"attack at dawn");
    Ok(())
}

#[test]
fn tampering_after_exchange_is_rejected() -> TestResult {
    let (mut alice, mut bob) = agreed_pair()?;
    bob.decrypt(&alice.encrypt(b"first", b"")?, b"")?;
    alice.decrypt(&bob.encrypt(b"reply", b"")?, b"")?;

    let msg = alice.encrypt(b"second", b"")?;
    let mut forged = msg.clone();
    forged.ciphertext[0] ^= 0x80;
    assert!(matches!(
        bob.decrypt(&forged, b""),
        Err(WhisperError::AuthenticationFailure { .. })
    ));
    assert_eq!(bob.decrypt(&msg, b"")?, b"second");
    Ok(())
}

// ---------------------------------------------------------------------------
// 4. Out-of-order delivery
// ---------------------------------------------------------------------------

#[test]
fn out_of_order_then_replay() -> TestResult {
    let (mut alice, mut bob) = agreed_pair()?;
    let sent: Vec<RatchetMessage> = ["zero", "one", "two"]
        .iter()
        .map(|t| alice.encrypt(t.as_bytes(), b""))
        .collect::<std::result::Result<_, _>>()?;

    assert_eq!(bob.decrypt(&sent[2], b"")?, b"two");
    assert_eq!(bob.skipped_key_count(), 2);
    assert_eq!(bob.decrypt(&sent[0], b"")?, b"zero");
    assert_eq!(bob.decrypt(&sent[1], b"")?, b"one");
    assert_eq!(bob.skipped_key_count(), 0);

    assert!(matches!(
        bob.decrypt(&sent[0], b""),
        Err(WhisperError::MessageKeyUnavailable { .. })
    ));
    Ok(())
}

#[test]
fn late_message_from_previous_chain() -> TestResult {
    let (mut alice, mut bob) = agreed_pair()?;
    let early = alice.encrypt(b"early", b"")?;
    let late = alice.encrypt(b"late", b"")?;
    bob.decrypt(&early, b"")?;

    alice.decrypt(&bob.encrypt(b"reply 1", b"")?, b"")?;
    alice.decrypt(&bob.encrypt(b"reply 2", b"")?, b"")?;
    let next = alice.encrypt(b"next chain", b"")?;
    assert_eq!(next.header.previous_chain_length, 2);

    // The new chain arrives first; the old chain's tail is cached.
    assert_eq!(bob.decrypt(&next, b"")?, b"next chain");
    assert_eq!(bob.skipped_key_count(), 1);
    assert_eq!(bob.decrypt(&late, b"")?, b"late");
    assert_eq!(bob.skipped_key_count(), 0);
    Ok(())
}

#[test]
fn skip_limit_is_configurable() -> TestResult {
    let config = RatchetConfig {
        max_skip: 3,
        ..RatchetConfig::default()
    };
    let a = alice_identity();
    let b = bob_identity();
    let root = RootKey::from_bytes([0x01; 32]);
    let mut alice =
        DoubleRatchetSession::with_config(root.clone(), a.clone(), b.public_key(), true, config.clone())?;
    let mut bob = DoubleRatchetSession::with_config(root, b, a.public_key(), false, config)?;

    let sent: Vec<RatchetMessage> = (0..5)
        .map(|i| alice.encrypt(&[i], b""))
        .collect::<std::result::Result<_, _>>()?;
    assert!(matches!(
        bob.decrypt(&sent[4], b""),
        Err(WhisperError::MalformedHeader { .. })
    ));
    assert_eq!(bob.decrypt(&sent[3], b"")?, vec![3u8]);
    assert_eq!(bob.decrypt(&sent[4], b"")?, vec![4u8]);
    Ok(())
}

// ---------------------------------------------------------------------------
// 5. Persistence
// ---------------------------------------------------------------------------

#[test]
fn state_survives_dh_and_symmetric_steps() -> TestResult {
    let (mut alice, mut bob) = agreed_pair()?;

    let m1 = alice.encrypt(b"one", b"")?;
    let m2 = alice.encrypt(b"two", b"")?;
    bob.decrypt(&m2, b"")?;
    alice.decrypt(&bob.encrypt(b"reply", b"")?, b"")?;

    for session in [&alice, &bob] {
        let state = session.to_state();
        let restored = restore(session)?;
        assert!(restored.to_state() == state);
        assert_eq!(
            restored.to_state().dh_ratchet.local_secret_key,
            state.dh_ratchet.local_secret_key
        );
    }

    // Restored sessions keep talking, skipped keys included.
    let mut bob = restore(&bob)?;
    let mut alice = restore(&alice)?;
    assert_eq!(bob.decrypt(&m1, b"")?, b"one");
    let m3 = alice.encrypt(b"three", b"")?;
    assert_eq!(bob.decrypt(&m3, b"")?, b"three");
    Ok(())
}

#[test]
fn responder_state_before_first_message() -> TestResult {
    let (mut alice, bob) = agreed_pair()?;
    let state = bob.to_state();
    assert!(state.sending_chain.is_none());
    assert!(state.receiving_chain.is_none());
    assert!(state.current_public_key.is_none());

    let mut bob = restore(&bob)?;
    let msg = alice.encrypt(b"hello", b"")?;
    assert_eq!(bob.decrypt(&msg, b"")?, b"hello");
    Ok(())
}
