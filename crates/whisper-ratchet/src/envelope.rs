//! Signed delivery envelope (version 2).
//!
//! ```json
//! {
//!   "version": 2,
//!   "from": "alice.wspr.eth",
//!   "to": "bob.wspr.eth",
//!   "timestamp": 1700000000000,
//!   "ratchet": {
//!     "ciphertext": "<b64url>",
//!     "mac": "<b64url>",
//!     "header": { "dhPublicKey": "<b64url>", "messageNumber": 0, "previousChainLength": 0 }
//!   },
//!   "initialEphemeralKey": "<b64url>",
//!   "signature": "<b64url>"
//! }
//! ```
//!
//! Binary values are unpadded base64url. The Ed25519 signature covers
//! the compact JSON of `{from, to, timestamp, ratchet_header}` in that
//! field order.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;
use whisper_crypto::ecdh::X25519PublicKey;
use whisper_crypto::mac::HMAC_SHA256_LEN;
use whisper_crypto::signing::{verify, Keypair, PublicKey, Signature};
use whisper_types::{Result, WhisperError};

use crate::header::MessageHeader;
use crate::session::RatchetMessage;

/// Envelope format version produced by [`Envelope::seal`].
pub const ENVELOPE_VERSION: u32 = 2;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireHeader {
    pub dh_public_key: String,
    pub message_number: u32,
    pub previous_chain_length: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRatchet {
    pub ciphertext: String,
    pub mac: String,
    pub header: WireHeader,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub version: u32,
    pub from: String,
    pub to: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub ratchet: WireRatchet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_ephemeral_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Signed portion of an envelope.
#[derive(Serialize)]
struct SignedFields<'a> {
    from: &'a str,
    to: &'a str,
    timestamp: u64,
    ratchet_header: &'a WireHeader,
}

/// Result of [`Envelope::open`].
#[derive(Clone, Debug)]
pub struct OpenedEnvelope {
    pub message: RatchetMessage,
    pub initial_ephemeral_key: Option<X25519PublicKey>,
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

fn decode(field: &str, value: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| WhisperError::MalformedHeader {
            reason: format!("{field} is not valid base64url: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

impl Envelope {
    /// Wraps `message` and signs it with the sender's Ed25519 key.
    pub fn seal(
        from: &str,
        to: &str,
        timestamp: u64,
        message: &RatchetMessage,
        initial_ephemeral_key: Option<&X25519PublicKey>,
        signer: &Keypair,
    ) -> Result<Self> {
        let header = &message.header;
        let mut envelope = Self {
            version: ENVELOPE_VERSION,
            from: from.to_string(),
            to: to.to_string(),
            timestamp,
            ratchet: WireRatchet {
                ciphertext: encode(&message.ciphertext),
                mac: encode(&message.mac),
                header: WireHeader {
                    dh_public_key: encode(header.dh_public_key.as_bytes()),
                    message_number: header.message_number,
                    previous_chain_length: header.previous_chain_length,
                },
            },
            initial_ephemeral_key: initial_ephemeral_key.map(|k| encode(k.as_bytes())),
            signature: None,
        };
        let signature = signer.sign(&envelope.signing_bytes()?);
        envelope.signature = Some(encode(signature.as_bytes()));
        Ok(envelope)
    }

    /// Deterministic bytes covered by the signature.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&SignedFields {
            from: &self.from,
            to: &self.to,
            timestamp: self.timestamp,
            ratchet_header: &self.ratchet.header,
        })
        .map_err(|e| WhisperError::ProtocolError {
            reason: format!("failed to encode signed envelope fields: {e}"),
        })
    }

    /// Checks the sender's signature.
    ///
    /// # Errors
    ///
    /// [`WhisperError::AuthenticationFailure`] if the signature is
    /// missing, undecodable or invalid.
    pub fn verify(&self, sender: &PublicKey) -> Result<()> {
        let encoded = self
            .signature
            .as_deref()
            .ok_or_else(|| WhisperError::AuthenticationFailure {
                reason: "envelope is not signed".into(),
            })?;
        let raw = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| WhisperError::AuthenticationFailure {
                reason: "signature is not valid base64url".into(),
            })?;
        let signature =
            Signature::from_slice(&raw).map_err(|_| WhisperError::AuthenticationFailure {
                reason: "signature has the wrong length".into(),
            })?;
        verify(sender, &self.signing_bytes()?, &signature).map_err(|_| {
            WhisperError::AuthenticationFailure {
                reason: format!("envelope signature from {} does not verify", self.from),
            }
        })
    }

    /// Verifies the signature and decodes the ratchet message.
    ///
    /// # Errors
    ///
    /// - [`WhisperError::ProtocolError`] on an unsupported version.
    /// - [`WhisperError::AuthenticationFailure`] on a bad signature or MAC length.
    /// - [`WhisperError::MalformedHeader`] on undecodable header fields.
    pub fn open(&self, sender: &PublicKey) -> Result<OpenedEnvelope> {
        if self.version != ENVELOPE_VERSION {
            return Err(WhisperError::ProtocolError {
                reason: format!(
                    "unsupported envelope version {}, expected {ENVELOPE_VERSION}",
                    self.version
                ),
            });
        }
        self.verify(sender)?;

        let wire = &self.ratchet.header;
        let header = MessageHeader::from_parts(
            &decode("dhPublicKey", &wire.dh_public_key)?,
            wire.message_number,
            wire.previous_chain_length,
        )?;
        let ciphertext = decode("ciphertext", &self.ratchet.ciphertext)?;
        let mac_bytes = decode("mac", &self.ratchet.mac)?;
        let mac: [u8; HMAC_SHA256_LEN] =
            mac_bytes
                .as_slice()
                .try_into()
                .map_err(|_| WhisperError::AuthenticationFailure {
                    reason: format!("mac must be {HMAC_SHA256_LEN} bytes, got {}", mac_bytes.len()),
                })?;

        let initial_ephemeral_key = match &self.initial_ephemeral_key {
            Some(encoded) => {
                let raw = decode("initialEphemeralKey", encoded)?;
                Some(X25519PublicKey::from_slice(&raw).map_err(|_| {
                    WhisperError::MalformedHeader {
                        reason: "initialEphemeralKey must be 32 bytes".into(),
                    }
                })?)
            }
            None => None,
        };

        debug!(from = %self.from, message_number = header.message_number, "opened envelope");
        Ok(OpenedEnvelope {
            message: RatchetMessage {
                header,
                ciphertext,
                mac,
            },
            initial_ephemeral_key,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| WhisperError::ProtocolError {
            reason: format!("failed to serialize envelope: {e}"),
        })
    }

    /// Parses an envelope received from the wire.
    ///
    /// # Errors
    ///
    /// - [`WhisperError::MalformedHeader`] if a header counter is missing or
    ///   is not an integer in `0..=u32::MAX`.
    /// - [`WhisperError::ProtocolError`] on any other malformed field.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| WhisperError::ProtocolError {
                reason: format!("malformed envelope: {e}"),
            })?;
        if let Some(header) = value.pointer("/ratchet/header") {
            check_counter(header, "messageNumber")?;
            check_counter(header, "previousChainLength")?;
        }
        serde_json::from_value(value).map_err(|e| WhisperError::ProtocolError {
            reason: format!("malformed envelope: {e}"),
        })
    }
}

fn check_counter(header: &serde_json::Value, field: &str) -> Result<()> {
    let raw = header.get(field).ok_or_else(|| WhisperError::MalformedHeader {
        reason: format!("header is missing {field}"),
    })?;
    match raw.as_u64() {
        Some(n) if u32::try_from(n).is_ok() => Ok(()),
        _ => Err(WhisperError::MalformedHeader {
            reason: format!("header {field} must be an integer in 0..=u32::MAX, got {raw}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> RatchetMessage {
        RatchetMessage {
            header: MessageHeader {
                dh_public_key: X25519PublicKey::from_bytes([0x42; 32]),
                message_number: 3,
                previous_chain_length: 1,
            },
            ciphertext: vec![1, 2, 3, 4, 5],
            mac: [0x99; 32],
        }
    }

    #[test]
    fn seal_then_open() -> std::result::Result<(), WhisperError> {
        let signer = Keypair::from_seed(&[7; 32]);
        let eph = X25519PublicKey::from_bytes([0x11; 32]);
        let env = Envelope::seal("alice", "bob", 1_700_000_000_000, &message(), Some(&eph), &signer)?;
        let parsed = Envelope::from_json(&env.to_json()?)?;
        let opened = parsed.open(&signer.public_key())?;
        assert_eq!(opened.message, message());
        assert_eq!(opened.initial_ephemeral_key, Some(eph));
        Ok(())
    }

    #[test]
    fn signed_bytes_layout() -> std::result::Result<(), WhisperError> {
        let signer = Keypair::from_seed(&[7; 32]);
        let env = Envelope::seal("a", "b", 5, &message(), None, &signer)?;
        let text = String::from_utf8(env.signing_bytes()?).map_err(|e| {
            WhisperError::ProtocolError {
                reason: e.to_string(),
            }
        })?;
        let prefix = "{\"from\":\"a\",\"to\":\"b\",\"timestamp\":5,\"ratchet_header\":{\"dhPublicKey\":\"";
        assert!(text.starts_with(prefix));
        assert!(text.ends_with("\"messageNumber\":3,\"previousChainLength\":1}}"));
        Ok(())
    }

    #[test]
    fn optional_fields_are_omitted() -> std::result::Result<(), WhisperError> {
        let signer = Keypair::from_seed(&[7; 32]);
        let env = Envelope::seal("a", "b", 5, &message(), None, &signer)?;
        let json = env.to_json()?;
        assert!(!json.contains("initialEphemeralKey"));
        assert!(!json.contains('='));
        Ok(())
    }

    #[test]
    fn tampered_header_fails_signature() -> std::result::Result<(), WhisperError> {
        let signer = Keypair::from_seed(&[7; 32]);
        let mut env = Envelope::seal("a", "b", 5, &message(), None, &signer)?;
        env.ratchet.header.message_number = 4;
        assert!(matches!(
            env.open(&signer.public_key()),
            Err(WhisperError::AuthenticationFailure { .. })
        ));
        Ok(())
    }

    #[test]
    fn wrong_signer_is_rejected() -> std::result::Result<(), WhisperError> {
        let signer = Keypair::from_seed(&[7; 32]);
        let other = Keypair::from_seed(&[8; 32]);
        let env = Envelope::seal("a", "b", 5, &message(), None, &signer)?;
        assert!(matches!(
            env.open(&other.public_key()),
            Err(WhisperError::AuthenticationFailure { .. })
        ));
        Ok(())
    }

    #[test]
    fn unsigned_envelope_is_rejected() -> std::result::Result<(), WhisperError> {
        let signer = Keypair::from_seed(&[7; 32]);
        let mut env = Envelope::seal("a", "b", 5, &message(), None, &signer)?;
        env.signature = None;
        assert!(matches!(
            env.verify(&signer.public_key()),
            Err(WhisperError::AuthenticationFailure { .. })
        ));
        Ok(())
    }

    #[test]
    fn short_header_key_is_malformed() -> std::result::Result<(), WhisperError> {
        let signer = Keypair::from_seed(&[7; 32]);
        let mut env = Envelope::seal("a", "b", 5, &message(), None, &signer)?;
        env.ratchet.header.dh_public_key = encode(&[1u8; 31]);
        env.signature = None;
        let resigned = signer.sign(&env.signing_bytes()?);
        env.signature = Some(encode(resigned.as_bytes()));
        assert!(matches!(
            env.open(&signer.public_key()),
            Err(WhisperError::MalformedHeader { .. })
        ));
        Ok(())
    }

    #[test]
    fn non_integer_counters_are_malformed() -> std::result::Result<(), WhisperError> {
        let signer = Keypair::from_seed(&[7; 32]);
        let json = Envelope::seal("a", "b", 5, &message(), None, &signer)?.to_json()?;
        let original = "\"messageNumber\":3,\"previousChainLength\":1";
        assert!(json.contains(original));

        for bad in [
            "\"messageNumber\":\"3\",\"previousChainLength\":1",
            "\"messageNumber\":-1,\"previousChainLength\":1",
            "\"messageNumber\":4294967296,\"previousChainLength\":1",
            "\"messageNumber\":3,\"previousChainLength\":1.5",
            "\"messageNumber\":3,\"previousChainLength\":null",
            "\"previousChainLength\":1",
        ] {
            let result = Envelope::from_json(&json.replace(original, bad));
            assert!(
                matches!(result, Err(WhisperError::MalformedHeader { .. })),
                "{bad} gave {result:?}"
            );
        }

        let boundary = json.replace(
            original,
            "\"messageNumber\":4294967295,\"previousChainLength\":0",
        );
        assert_eq!(Envelope::from_json(&boundary)?.ratchet.header.message_number, u32::MAX);
        Ok(())
    }

    #[test]
    fn malformed_body_is_protocol_error() {
        assert!(matches!(
            Envelope::from_json("{\"version\":2}"),
            Err(WhisperError::ProtocolError { .. })
        ));
        assert!(matches!(
            Envelope::from_json("not json"),
            Err(WhisperError::ProtocolError { .. })
        ));
    }

    #[test]
    fn old_version_is_rejected() -> std::result::Result<(), WhisperError> {
        let signer = Keypair::from_seed(&[7; 32]);
        let mut env = Envelope::seal("a", "b", 5, &message(), None, &signer)?;
        env.version = 1;
        assert!(matches!(
            env.open(&signer.public_key()),
            Err(WhisperError::ProtocolError { .. })
        ));
        Ok(())
    }

    #[test]
    fn now_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }
}
