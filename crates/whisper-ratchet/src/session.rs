//! Double Ratchet session: the encrypt/decrypt state machine.
//!
//! # Encrypt
//!
//! 1. If no sending chain exists, perform a sending DH step and record
//!    the receiving chain's length as `previous_chain_length`.
//! 2. Advance the sending chain, expand the message key.
//! 3. `ciphertext = ChaCha20-Poly1305(enc_key, iv[..12], plaintext)`.
//! 4. `mac = HMAC(auth_key, ad || header bytes || ciphertext)`.
//!
//! # Decrypt
//!
//! 1. A cached skipped key for `(header key, n)` is tried first.
//! 2. Otherwise, if the header carries a new ratchet key, cache the
//!    remaining keys of the old receiving chain up to
//!    `previous_chain_length` and perform a receiving DH step.
//! 3. Cache keys up to `n`, derive key `n`, verify the MAC, decrypt.
//!
//! All decrypt work happens on staged copies that are committed only
//! after the MAC and the cipher both succeed, so a rejected message
//! leaves the session exactly as it was.

use tracing::{debug, warn};
use whisper_crypto::aead::{decrypt_chacha20, encrypt_chacha20};
use whisper_crypto::ecdh::{X25519KeyPair, X25519PublicKey};
use whisper_crypto::mac::{hmac_sha256_parts, verify_hmac_sha256_parts, HMAC_SHA256_LEN};
use whisper_types::{RatchetConfig, Result, WhisperError};

use crate::dh::DhRatchet;
use crate::header::MessageHeader;
use crate::kdf::{derive_message_keys, MessageKey, RootKey};
use crate::skipped::SkippedKeys;
use crate::symmetric::SymmetricRatchet;

// ---------------------------------------------------------------------------
// RatchetMessage
// ---------------------------------------------------------------------------

/// One encrypted message as produced by [`DoubleRatchetSession::encrypt`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RatchetMessage {
    pub header: MessageHeader,
    pub ciphertext: Vec<u8>,
    pub mac: [u8; HMAC_SHA256_LEN],
}

// ---------------------------------------------------------------------------
// DoubleRatchetSession
// ---------------------------------------------------------------------------

/// Per-peer Double Ratchet state.
///
/// Not safe for concurrent use; callers serialize access per session.
/// Does not implement Debug to prevent leakage.
pub struct DoubleRatchetSession {
    pub(crate) dh_ratchet: DhRatchet,
    pub(crate) sending_chain: Option<SymmetricRatchet>,
    pub(crate) receiving_chain: Option<SymmetricRatchet>,
    pub(crate) current_public_key: Option<X25519PublicKey>,
    pub(crate) previous_chain_length: u32,
    pub(crate) skipped: SkippedKeys,
    pub(crate) config: RatchetConfig,
}

/// Skipped keys derived during a decrypt, committed only on success.
type StagedKeys = Vec<([u8; 32], u32, MessageKey)>;

impl DoubleRatchetSession {
    /// Creates a session with the default [`RatchetConfig`].
    ///
    /// The initiator immediately performs a sending DH step against
    /// `remote_public_key`; the responder waits for the first message.
    pub fn new(
        root_key: RootKey,
        local_key_pair: X25519KeyPair,
        remote_public_key: X25519PublicKey,
        is_initiator: bool,
    ) -> Result<Self> {
        Self::with_config(
            root_key,
            local_key_pair,
            remote_public_key,
            is_initiator,
            RatchetConfig::default(),
        )
    }

    /// Creates a session with explicit limits.
    ///
    /// # Errors
    ///
    /// [`WhisperError::ConfigError`] if `config` is invalid, or any
    /// error from the initiator's first DH step.
    pub fn with_config(
        root_key: RootKey,
        local_key_pair: X25519KeyPair,
        remote_public_key: X25519PublicKey,
        is_initiator: bool,
        config: RatchetConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut session = Self {
            dh_ratchet: DhRatchet::new(root_key, local_key_pair, Some(remote_public_key)),
            sending_chain: None,
            receiving_chain: None,
            current_public_key: None,
            previous_chain_length: 0,
            skipped: SkippedKeys::new(),
            config,
        };
        if is_initiator {
            session.start_sending_chain()?;
        }
        debug!(is_initiator, "double ratchet session created");
        Ok(session)
    }

    // ----- Accessors -----

    /// Ratchet public key carried in our outgoing headers, once known.
    pub fn current_public_key(&self) -> Option<X25519PublicKey> {
        self.current_public_key
    }

    /// Peer's most recent ratchet public key.
    pub fn remote_public_key(&self) -> Option<X25519PublicKey> {
        self.dh_ratchet.remote_public_key()
    }

    pub fn previous_chain_length(&self) -> u32 {
        self.previous_chain_length
    }

    /// Next message number of the sending chain, if one exists.
    pub fn sending_message_number(&self) -> Option<u32> {
        self.sending_chain.as_ref().map(SymmetricRatchet::message_number)
    }

    /// Next expected message number of the receiving chain, if one exists.
    pub fn receiving_message_number(&self) -> Option<u32> {
        self.receiving_chain
            .as_ref()
            .map(SymmetricRatchet::message_number)
    }

    pub fn skipped_key_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn config(&self) -> &RatchetConfig {
        &self.config
    }

    /// Fingerprint of the current root key. Equal on both sides after
    /// each completed exchange.
    pub fn root_fingerprint(&self) -> [u8; 32] {
        self.dh_ratchet.root_key().fingerprint()
    }

    /// Discards the oldest skipped keys until at most `max` remain.
    pub fn prune_skipped_keys(&mut self, max: usize) -> usize {
        let removed = self.skipped.prune_oldest(max);
        if removed > 0 {
            debug!(removed, remaining = self.skipped.len(), "pruned skipped message keys");
        }
        removed
    }

    // ----- Encrypt -----

    /// Encrypts `plaintext`, binding `associated_data` into the MAC.
    ///
    /// # Errors
    ///
    /// [`WhisperError::PreconditionViolation`] if the plaintext exceeds
    /// the configured limit or the sending chain cannot be started.
    pub fn encrypt(&mut self, plaintext: &[u8], associated_data: &[u8]) -> Result<RatchetMessage> {
        if plaintext.len() > self.config.max_plaintext_len {
            return Err(WhisperError::PreconditionViolation {
                reason: format!(
                    "plaintext of {} bytes exceeds limit of {}",
                    plaintext.len(),
                    self.config.max_plaintext_len
                ),
            });
        }

        if self.sending_chain.is_none() {
            self.start_sending_chain()?;
        }

        let dh_public_key =
            self.current_public_key
                .ok_or_else(|| WhisperError::PreconditionViolation {
                    reason: "no current ratchet public key".into(),
                })?;
        let chain = self
            .sending_chain
            .as_mut()
            .ok_or_else(|| WhisperError::PreconditionViolation {
                reason: "no sending chain".into(),
            })?;
        let step = chain.ratchet_forward()?;

        let header = MessageHeader {
            dh_public_key,
            message_number: step.message_number,
            previous_chain_length: self.previous_chain_length,
        };
        let keys = derive_message_keys(&step.message_key)?;
        let ciphertext = encrypt_chacha20(&keys.enc_key, &keys.nonce(), plaintext, &[])?;
        let mac = hmac_sha256_parts(
            &keys.auth_key,
            &[associated_data, &header.to_bytes(), &ciphertext],
        )?;

        debug!(message_number = header.message_number, "encrypted message");
        Ok(RatchetMessage {
            header,
            ciphertext,
            mac,
        })
    }

    fn start_sending_chain(&mut self) -> Result<()> {
        let previous = self
            .receiving_chain
            .as_ref()
            .map_or(0, SymmetricRatchet::message_number);
        let step = self.dh_ratchet.ratchet_send()?;
        self.sending_chain = Some(SymmetricRatchet::new(step.chain_key));
        self.current_public_key = Some(step.public_key);
        self.previous_chain_length = previous;
        Ok(())
    }

    // ----- Decrypt -----

    /// Authenticates and decrypts `message`.
    ///
    /// # Errors
    ///
    /// - [`WhisperError::AuthenticationFailure`] if the MAC does not verify.
    /// - [`WhisperError::DecryptionFailure`] if the MAC verifies but the
    ///   payload does not decrypt.
    /// - [`WhisperError::MessageKeyUnavailable`] if the key for this
    ///   message was already consumed or discarded.
    /// - [`WhisperError::MalformedHeader`] if the header demands more
    ///   skipped keys than allowed or carries an unusable public key.
    ///
    /// On any error the session state is unchanged.
    pub fn decrypt(&mut self, message: &RatchetMessage, associated_data: &[u8]) -> Result<Vec<u8>> {
        let result = self.decrypt_inner(message, associated_data);
        if let Err(e) = &result {
            warn!(
                message_number = message.header.message_number,
                error = %e,
                "rejected incoming message"
            );
        }
        result
    }

    fn decrypt_inner(&mut self, message: &RatchetMessage, associated_data: &[u8]) -> Result<Vec<u8>> {
        let header = &message.header;
        let header_key = header.dh_public_key.to_bytes();

        if let Some(key) = self.skipped.get(&header_key, header.message_number) {
            let plaintext = open(key, message, associated_data)?;
            self.skipped.take(&header_key, header.message_number);
            debug!(
                message_number = header.message_number,
                "decrypted with skipped message key"
            );
            return Ok(plaintext);
        }

        let needs_ratchet = self.receiving_chain.is_none()
            || self.dh_ratchet.remote_public_key() != Some(header.dh_public_key);

        let mut dh_ratchet = self.dh_ratchet.clone();
        let mut receiving = self.receiving_chain.clone();
        let mut staged = StagedKeys::new();

        if needs_ratchet {
            if let (Some(chain), Some(old_remote)) =
                (receiving.as_mut(), dh_ratchet.remote_public_key())
            {
                self.skip_keys(
                    chain,
                    old_remote.as_bytes(),
                    header.previous_chain_length,
                    &mut staged,
                )?;
            }
            let chain_key = dh_ratchet
                .ratchet_receive(header.dh_public_key)
                .map_err(|e| match e {
                    WhisperError::CryptoError { reason } => WhisperError::MalformedHeader { reason },
                    other => other,
                })?;
            receiving = Some(SymmetricRatchet::new(chain_key));
        }

        let chain = receiving
            .as_mut()
            .ok_or_else(|| WhisperError::PreconditionViolation {
                reason: "no receiving chain".into(),
            })?;

        if header.message_number < chain.message_number() {
            return Err(WhisperError::MessageKeyUnavailable {
                reason: format!(
                    "key for message {} already consumed or discarded",
                    header.message_number
                ),
            });
        }

        self.skip_keys(chain, &header_key, header.message_number, &mut staged)?;
        let step = chain.ratchet_forward()?;
        let plaintext = open(&step.message_key, message, associated_data)?;

        // ----- Commit -----
        if needs_ratchet {
            self.sending_chain = None;
            self.current_public_key = Some(dh_ratchet.local_key_pair().public_key());
        }
        self.dh_ratchet = dh_ratchet;
        self.receiving_chain = receiving;
        let newly_skipped = staged.len();
        for (dh, n, key) in staged {
            self.skipped.insert(dh, n, key);
        }

        debug!(
            message_number = header.message_number,
            dh_step = needs_ratchet,
            newly_skipped,
            "decrypted message"
        );
        Ok(plaintext)
    }

    /// Derives and stages keys for every message number below `until`.
    fn skip_keys(
        &self,
        chain: &mut SymmetricRatchet,
        dh_public_key: &[u8; 32],
        until: u32,
        staged: &mut StagedKeys,
    ) -> Result<()> {
        let current = chain.message_number();
        if until <= current {
            return Ok(());
        }
        let gap = until - current;
        if gap > self.config.max_skip {
            return Err(WhisperError::MalformedHeader {
                reason: format!(
                    "header skips {gap} messages, limit is {}",
                    self.config.max_skip
                ),
            });
        }
        while chain.message_number() < until {
            let step = chain.ratchet_forward()?;
            staged.push((*dh_public_key, step.message_number, step.message_key));
        }
        Ok(())
    }
}

/// Verifies the MAC, then decrypts the payload.
fn open(key: &MessageKey, message: &RatchetMessage, associated_data: &[u8]) -> Result<Vec<u8>> {
    let keys = derive_message_keys(key)?;
    verify_hmac_sha256_parts(
        &keys.auth_key,
        &[
            associated_data,
            &message.header.to_bytes(),
            &message.ciphertext,
        ],
        &message.mac,
    )?;
    decrypt_chacha20(&keys.enc_key, &keys.nonce(), &message.ciphertext, &[]).map_err(|_| {
        WhisperError::DecryptionFailure {
            reason: "payload failed to decrypt after MAC verification".into(),
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
