//! Published profile documents.
//!
//! A profile is the JSON a name resolves to. Only the public key
//! material and the optional mailbox endpoint are read:
//!
//! ```json
//! {
//!   "usage_identity": {
//!     "pub": {
//!       "x25519_spki_b64u": "<b64url SPKI or raw key>",
//!       "ed25519_spki_b64u": "<b64url SPKI or raw key>"
//!     }
//!   },
//!   "mailbox": { "mailbox_id": "...", "deposit_tokens": ["..."] }
//! }
//! ```

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use whisper_crypto::ecdh::X25519PublicKey;
use whisper_crypto::signing::PublicKey;
use whisper_types::{Result, WhisperError};

/// DER prefix of an X25519 SubjectPublicKeyInfo (OID 1.3.101.110).
pub const X25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x6e, 0x03, 0x21, 0x00,
];

/// DER prefix of an Ed25519 SubjectPublicKeyInfo (OID 1.3.101.112).
pub const ED25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

// ----- Document shape -----

#[derive(Deserialize)]
struct ProfileDocument {
    usage_identity: UsageIdentity,
    #[serde(default)]
    mailbox: Option<MailboxEndpoint>,
}

#[derive(Deserialize)]
struct UsageIdentity {
    #[serde(rename = "pub")]
    public: PublicKeys,
}

#[derive(Deserialize)]
struct PublicKeys {
    x25519_spki_b64u: String,
    ed25519_spki_b64u: String,
}

/// Message-drop endpoint advertised by a profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxEndpoint {
    pub mailbox_id: String,
    #[serde(default)]
    pub deposit_tokens: Vec<String>,
}

/// Keys and endpoint extracted from a profile document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WhisperProfile {
    pub x25519: X25519PublicKey,
    pub ed25519: PublicKey,
    pub mailbox: Option<MailboxEndpoint>,
}

impl WhisperProfile {
    /// Parses a profile document.
    ///
    /// # Errors
    ///
    /// [`WhisperError::InvalidProfile`] if the JSON is malformed or a
    /// key is not 32 raw bytes after removing the SPKI framing.
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: ProfileDocument =
            serde_json::from_str(json).map_err(|e| WhisperError::InvalidProfile {
                reason: format!("malformed profile document: {e}"),
            })?;
        let keys = &doc.usage_identity.public;
        let x25519 = spki_to_raw(&decode_key("x25519", &keys.x25519_spki_b64u)?, &X25519_SPKI_PREFIX)?;
        let ed25519 =
            spki_to_raw(&decode_key("ed25519", &keys.ed25519_spki_b64u)?, &ED25519_SPKI_PREFIX)?;
        Ok(Self {
            x25519: X25519PublicKey::from_bytes(x25519),
            ed25519: PublicKey::from_bytes(ed25519),
            mailbox: doc.mailbox,
        })
    }
}

fn decode_key(label: &str, value: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| WhisperError::InvalidProfile {
            reason: format!("{label} key is not valid base64url: {e}"),
        })
}

/// Strips SPKI framing, returning the raw 32-byte key.
///
/// Accepts either the bare key or `prefix || key`.
pub fn spki_to_raw(bytes: &[u8], prefix: &[u8; 12]) -> Result<[u8; 32]> {
    let raw = match bytes.len() {
        32 => bytes,
        44 if bytes[..12] == prefix[..] => &bytes[12..],
        44 => {
            return Err(WhisperError::InvalidProfile {
                reason: "SPKI prefix does not match the expected algorithm".into(),
            })
        }
        n => {
            return Err(WhisperError::InvalidProfile {
                reason: format!("public key must be 32 raw or 44 SPKI bytes, got {n}"),
            })
        }
    };
    let mut out = [0u8; 32];
    out.copy_from_slice(raw);
    Ok(out)
}

// ----- Resolution -----

/// Resolves a human-readable name to its profile.
pub trait ProfileResolver {
    fn resolve(&self, name: &str) -> Result<WhisperProfile>;
}

/// In-memory resolver.
#[derive(Default)]
pub struct StaticResolver {
    profiles: HashMap<String, WhisperProfile>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, profile: WhisperProfile) {
        self.profiles.insert(name.into(), profile);
    }
}

impl ProfileResolver for StaticResolver {
    fn resolve(&self, name: &str) -> Result<WhisperProfile> {
        self.profiles
            .get(name)
            .cloned()
            .ok_or_else(|| WhisperError::InvalidProfile {
                reason: format!("no profile published for {name}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(bytes: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn spki(prefix: &[u8; 12], key: [u8; 32]) -> Vec<u8> {
        let mut out = prefix.to_vec();
        out.extend_from_slice(&key);
        out
    }

    fn document(x: &[u8], ed: &[u8]) -> String {
        format!(
            r#"{{"usage_identity":{{"pub":{{"x25519_spki_b64u":"{}","ed25519_spki_b64u":"{}"}}}},
               "mailbox":{{"mailbox_id":"mb-1","deposit_tokens":["tok"]}}}}"#,
            b64(x),
            b64(ed)
        )
    }

    #[test]
    fn parses_spki_keys_and_mailbox() -> std::result::Result<(), WhisperError> {
        let json = document(
            &spki(&X25519_SPKI_PREFIX, [1; 32]),
            &spki(&ED25519_SPKI_PREFIX, [2; 32]),
        );
        let profile = WhisperProfile::from_json(&json)?;
        assert_eq!(profile.x25519.as_bytes(), &[1; 32]);
        assert_eq!(profile.ed25519.as_bytes(), &[2; 32]);
        let mailbox = profile.mailbox.ok_or_else(|| WhisperError::InvalidProfile {
            reason: "mailbox missing".into(),
        })?;
        assert_eq!(mailbox.mailbox_id, "mb-1");
        assert_eq!(mailbox.deposit_tokens, vec!["tok".to_string()]);
        Ok(())
    }

    #[test]
    fn accepts_raw_keys() -> std::result::Result<(), WhisperError> {
        let profile = WhisperProfile::from_json(&document(&[3; 32], &[4; 32]))?;
        assert_eq!(profile.x25519.as_bytes(), &[3; 32]);
        Ok(())
    }

    #[test]
    fn swapped_algorithms_are_rejected() {
        let json = document(
            &spki(&ED25519_SPKI_PREFIX, [1; 32]),
            &spki(&ED25519_SPKI_PREFIX, [2; 32]),
        );
        assert!(matches!(
            WhisperProfile::from_json(&json),
            Err(WhisperError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(matches!(
            WhisperProfile::from_json(&document(&[3; 31], &[4; 32])),
            Err(WhisperError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn missing_keys_are_rejected() {
        assert!(matches!(
            WhisperProfile::from_json(r#"{"usage_identity":{"pub":{}}}"#),
            Err(WhisperError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn static_resolver_lookup() -> std::result::Result<(), WhisperError> {
        let mut resolver = StaticResolver::new();
        let profile = WhisperProfile::from_json(&document(&[5; 32], &[6; 32]))?;
        resolver.insert("bob.wspr.eth", profile.clone());
        assert_eq!(resolver.resolve("bob.wspr.eth")?, profile);
        assert!(matches!(
            resolver.resolve("carol.wspr.eth"),
            Err(WhisperError::InvalidProfile { .. })
        ));
        Ok(())
    }
}
