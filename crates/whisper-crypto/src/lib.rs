//! Cryptographic primitives for the Whisper messaging core.
//!
//! This crate is the only place in the workspace that touches raw
//! crypto libraries. The ratchet and storage crates build on the
//! wrappers exported here.
//!
//! # Modules
//!
//! - [`hkdf`]: HKDF-SHA256 extract-and-expand
//! - [`mac`]: HMAC-SHA256 computation and constant-time verification
//! - [`hash`]: SHA-256 digests
//! - [`ecdh`]: X25519 key pairs and Diffie-Hellman agreement
//! - [`aead`]: ChaCha20-Poly1305 payload encryption
//! - [`signing`]: Ed25519 signatures for delivery envelopes

pub mod aead;
pub mod ecdh;
pub mod hash;
pub mod hkdf;
pub mod mac;
pub mod signing;
