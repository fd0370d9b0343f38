//! Double Ratchet session protocol for Whisper.
//!
//! Two parties agree on a root key with an X3DH-style exchange, then
//! each runs a [`DoubleRatchetSession`] that combines a Diffie-Hellman
//! ratchet (break-in recovery) with per-direction symmetric chains
//! (forward secrecy). Messages may arrive out of order; skipped
//! message keys are cached until consumed.
//!
//! # Modules
//!
//! - [`kdf`]: root-key, chain-key and message-key derivation
//! - [`symmetric`]: per-direction chain advance
//! - [`dh`]: rotating X25519 ratchet and root-key evolution
//! - [`x3dh`]: initiator/responder root-key agreement
//! - [`header`]: message header and its canonical bytes
//! - [`skipped`]: bounded cache of skipped message keys
//! - [`session`]: the encrypt/decrypt state machine
//! - [`state`]: versioned, serializable session state
//! - [`envelope`]: signed delivery envelope
//! - [`profile`]: published profile documents and resolution

pub mod dh;
pub mod envelope;
pub mod header;
pub mod kdf;
pub mod profile;
pub mod session;
pub mod skipped;
pub mod state;
pub mod symmetric;
pub mod x3dh;

pub use header::MessageHeader;
pub use kdf::RootKey;
pub use session::{DoubleRatchetSession, RatchetMessage};
pub use state::SessionState;
