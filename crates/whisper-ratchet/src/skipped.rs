//! Cache of message keys derived for messages not yet received.
//!
//! Keys are indexed by `(ratchet public key, message number)` and kept
//! in insertion order so the oldest can be discarded first. Lookup is a
//! `HashMap`, ordering is a `VecDeque`.

use std::collections::{HashMap, VecDeque};

use crate::kdf::MessageKey;

/// `(ratchet public key bytes, message number)`.
pub type SkippedKeyId = ([u8; 32], u32);

/// Insertion-ordered map of skipped message keys.
#[derive(Clone, Default)]
pub struct SkippedKeys {
    keys: HashMap<SkippedKeyId, MessageKey>,
    order: VecDeque<SkippedKeyId>,
}

impl SkippedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a key. Re-inserting an existing id replaces the key but
    /// keeps its original position.
    pub fn insert(&mut self, dh_public_key: [u8; 32], message_number: u32, key: MessageKey) {
        let id = (dh_public_key, message_number);
        if self.keys.insert(id, key).is_none() {
            self.order.push_back(id);
        }
    }

    pub fn get(&self, dh_public_key: &[u8; 32], message_number: u32) -> Option<&MessageKey> {
        self.keys.get(&(*dh_public_key, message_number))
    }

    /// Removes and returns a key.
    pub fn take(&mut self, dh_public_key: &[u8; 32], message_number: u32) -> Option<MessageKey> {
        let id = (*dh_public_key, message_number);
        let key = self.keys.remove(&id)?;
        self.order.retain(|entry| entry != &id);
        Some(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Drops the oldest entries until at most `max` remain. Returns the
    /// number removed.
    pub fn prune_oldest(&mut self, max: usize) -> usize {
        let mut removed = 0;
        while self.keys.len() > max {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.keys.remove(&oldest);
                    removed += 1;
                }
                None => break,
            }
        }
        removed
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8; 32], u32, &MessageKey)> + '_ {
        self.order.iter().filter_map(move |id| {
            self.keys
                .get(id)
                .map(|key| (&id.0, id.1, key))
        })
    }
}
