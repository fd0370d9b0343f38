//! Message header and its canonical byte form.
//!
//! The header travels in clear but is bound to the ciphertext by the
//! message MAC, which covers these exact bytes:
//!
//! ```text
//! dh_public_key (32) || message_number (u32 BE) || previous_chain_length (u32 BE)
//! ```

use whisper_crypto::ecdh::X25519PublicKey;
use whisper_types::{Result, WhisperError};

/// Length of [`MessageHeader::to_bytes`].
pub const HEADER_LEN: usize = 32 + 4 + 4;

/// Ratchet header sent with every message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MessageHeader {
    /// Sender's current ratchet public key.
    pub dh_public_key: X25519PublicKey,
    /// Position within the sender's current sending chain.
    pub message_number: u32,
    /// Length of the sender's previous sending chain.
    pub previous_chain_length: u32,
}

impl MessageHeader {
    /// Canonical encoding authenticated by the message MAC.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..32].copy_from_slice(self.dh_public_key.as_bytes());
        out[32..36].copy_from_slice(&self.message_number.to_be_bytes());
        out[36..40].copy_from_slice(&self.previous_chain_length.to_be_bytes());
        out
    }

    /// Parses the canonical encoding.
    ///
    /// # Errors
    ///
    /// [`WhisperError::MalformedHeader`] if `bytes` is not exactly
    /// [`HEADER_LEN`] long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HEADER_LEN {
            return Err(WhisperError::MalformedHeader {
                reason: format!("header must be {HEADER_LEN} bytes, got {}", bytes.len()),
            });
        }
        let mut dh = [0u8; 32];
        dh.copy_from_slice(&bytes[..32]);
        let mut n = [0u8; 4];
        n.copy_from_slice(&bytes[32..36]);
        let mut pn = [0u8; 4];
        pn.copy_from_slice(&bytes[36..40]);
        Ok(Self {
            dh_public_key: X25519PublicKey::from_bytes(dh),
            message_number: u32::from_be_bytes(n),
            previous_chain_length: u32::from_be_bytes(pn),
        })
    }

    /// Builds a header from wire fields, checking the key length.
    pub fn from_parts(
        dh_public_key: &[u8],
        message_number: u32,
        previous_chain_length: u32,
    ) -> Result<Self> {
        let dh_public_key = X25519PublicKey::from_slice(dh_public_key).map_err(|_| {
            WhisperError::MalformedHeader {
                reason: format!(
                    "ratchet public key must be 32 bytes, got {}",
                    dh_public_key.len()
                ),
            }
        })?;
        Ok(Self {
            dh_public_key,
            message_number,
            previous_chain_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MessageHeader {
        MessageHeader {
            dh_public_key: X25519PublicKey::from_bytes([0xAB; 32]),
            message_number: 0x0102_0304,
            previous_chain_length: 7,
        }
    }

    #[test]
    fn canonical_layout_is_big_endian() {
        let bytes = sample().to_bytes();
        assert_eq!(&bytes[..32], &[0xAB; 32]);
        assert_eq!(&bytes[32..36], &[1, 2, 3, 4]);
        assert_eq!(&bytes[36..40], &[0, 0, 0, 7]);
    }

    #[test]
    fn parse_recovers_fields() -> std::result::Result<(), WhisperError> {
        let header = sample();
        assert_eq!(MessageHeader::from_bytes(&header.to_bytes())?, header);
        Ok(())
    }

    #[test]
    fn wrong_length_is_malformed() {
        for len in [0usize, 32, 39, 41] {
            assert!(matches!(
                MessageHeader::from_bytes(&vec![0u8; len]),
                Err(WhisperError::MalformedHeader { .. })
            ));
        }
    }

    #[test]
    fn short_key_in_parts_is_malformed() {
        assert!(matches!(
            MessageHeader::from_parts(&[1u8; 31], 0, 0),
            Err(WhisperError::MalformedHeader { .. })
        ));
    }
}
