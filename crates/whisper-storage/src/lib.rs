//! Session persistence for Whisper.
//!
//! A [`SessionStore`] keeps one [`SessionRecord`] per peer pair on top
//! of any [`StorageBackend`]. The [`SessionManager`] serializes every
//! load, mutate and persist cycle per peer pair so concurrent sends
//! never fork a ratchet.
//!
//! # Modules
//!
//! - [`backend`]: key/value backend trait, memory and sled backends
//! - [`encrypted`]: encrypt-at-rest wrapper for any backend
//! - [`record`]: persisted session record and peer-pair keys
//! - [`store`]: load/save/delete/list with skipped-key pruning
//! - [`manager`]: locking session manager

pub mod backend;
pub mod encrypted;
pub mod manager;
pub mod record;
pub mod store;

pub use backend::{MemoryBackend, SledBackend, StorageBackend};
pub use encrypted::EncryptedBackend;
pub use manager::{OutboundMessage, PeerContext, SessionManager};
pub use record::{peer_pair_key, SessionRecord};
pub use store::{SessionStore, SessionSummary};
