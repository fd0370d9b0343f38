//! Core shared types for the Whisper end-to-end messaging core.
//!
//! This crate defines the error surface and configuration shared by
//! every other crate in the workspace. Nothing here performs crypto
//! or I/O.

pub mod config;

use thiserror::Error;

pub use config::RatchetConfig;

// ---------------------------------------------------------------------------
// WhisperError
// ---------------------------------------------------------------------------

/// Central error type for the Whisper messaging core.
///
/// Every failure in the workspace is reported as one of these variants.
/// None of them is fatal: a session that returns an error from
/// `decrypt` is left exactly as it was before the call.
#[derive(Debug, Error)]
pub enum WhisperError {
    /// An operation was invoked in a state that does not permit it
    /// (e.g. a sending DH ratchet step without a known remote key).
    #[error("precondition violation: {reason}")]
    PreconditionViolation {
        /// Human-readable description of the violated precondition.
        reason: String,
    },

    /// A message header is structurally invalid (wrong key length,
    /// bad encoding, implausible counters).
    #[error("malformed header: {reason}")]
    MalformedHeader {
        /// Human-readable description of the header problem.
        reason: String,
    },

    /// The message MAC did not verify. Always treated as a potential
    /// forgery.
    #[error("authentication failure: {reason}")]
    AuthenticationFailure {
        /// Human-readable description of the authentication failure.
        reason: String,
    },

    /// The payload cipher failed after the MAC had already passed.
    #[error("decryption failure: {reason}")]
    DecryptionFailure {
        /// Human-readable description of the cipher failure.
        reason: String,
    },

    /// The initiator and responder derived different root keys.
    #[error("key agreement mismatch: {reason}")]
    KeyAgreementMismatch {
        /// Human-readable description of the mismatch.
        reason: String,
    },

    /// No message key is available for the requested message: it was
    /// already consumed or its skipped key was pruned.
    #[error("message key unavailable: {reason}")]
    MessageKeyUnavailable {
        /// Human-readable description including the message number.
        reason: String,
    },

    /// A low-level cryptographic primitive failed.
    #[error("crypto error: {reason}")]
    CryptoError {
        /// Human-readable description of the cryptographic failure.
        reason: String,
    },

    /// A storage backend operation failed.
    #[error("storage error: {reason}")]
    StorageError {
        /// Human-readable description of the storage failure.
        reason: String,
    },

    /// A serialization, schema or version error in persisted state or
    /// wire envelopes.
    #[error("protocol error: {reason}")]
    ProtocolError {
        /// Human-readable description of the protocol failure.
        reason: String,
    },

    /// A profile document is missing fields or carries malformed keys.
    #[error("invalid profile: {reason}")]
    InvalidProfile {
        /// Human-readable description of the profile problem.
        reason: String,
    },

    /// A configuration value is invalid.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, WhisperError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_reason() {
        let err = WhisperError::MalformedHeader {
            reason: "dh public key must be 32 bytes".into(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("malformed header"));
        assert!(msg.contains("32 bytes"));
    }

    #[test]
    fn authentication_and_replay_are_distinct() {
        let auth = WhisperError::AuthenticationFailure {
            reason: "mac mismatch".into(),
        };
        let replay = WhisperError::MessageKeyUnavailable {
            reason: "message 0 already consumed".into(),
        };
        assert!(matches!(auth, WhisperError::AuthenticationFailure { .. }));
        assert!(matches!(replay, WhisperError::MessageKeyUnavailable { .. }));
        assert_ne!(auth.to_string(), replay.to_string());
    }
}
