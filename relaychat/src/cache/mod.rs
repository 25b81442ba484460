//! Bounded per-contact message logs and their write-forwarding hierarchy.
//!
//! A [`MessageCache`] holds one [`ContactCache`] per contact name and may
//! forward every accepted write to a parent [`MessageSink`]. The parent is
//! held weakly: the hierarchy owner ([`hierarchy::CacheHierarchy`]) keeps
//! every node alive, and a write whose parent is gone is simply not
//! forwarded.
//!
//! # Eviction
//!
//! Eviction runs only when a contact's log has *already* grown past its
//! capacity at the start of a write. The steady-state length of a log is
//! therefore `capacity + 1`, and never more than that.

pub mod conflated;
pub mod hierarchy;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Anything that accepts a message written under a contact name.
pub trait MessageSink: Send + Sync {
    /// Record `text` under `contact`.
    ///
    /// `display` asks terminal-mirroring sinks to reprint their feed after
    /// the write. Returns whether the write was accepted.
    fn save_message(&self, contact: &str, text: &str, display: bool) -> bool;
}

/// Bounded, insertion-ordered message log for a single contact.
#[derive(Debug, Clone)]
pub struct ContactCache {
    capacity: usize,
    messages: VecDeque<String>,
}

impl ContactCache {
    /// Create an empty log with the given capacity.
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            messages: VecDeque::new(),
        }
    }

    /// Append a message, first dropping the oldest entry if the log has
    /// already exceeded its capacity.
    ///
    /// Returns `true` if an entry was evicted.
    pub fn push(&mut self, text: &str) -> bool {
        let evicted = self.messages.len() > self.capacity;
        if evicted {
            self.messages.pop_front();
        }
        self.messages.push_back(text.to_string());
        evicted
    }

    /// Number of messages currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if the log holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the log, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.iter().cloned().collect()
    }
}

/// A set of per-contact logs with optional forwarding to a parent sink.
pub struct MessageCache {
    /// Capacity given to every newly created contact log.
    capacity: usize,
    /// Contact name -> log.
    contacts: Mutex<HashMap<String, ContactCache>>,
    /// Parent sink that receives a copy of every accepted write.
    parent: Option<Weak<dyn MessageSink>>,
}

impl MessageCache {
    /// Create a root cache (no parent).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            contacts: Mutex::new(HashMap::new()),
            parent: None,
        }
    }

    /// Create a cache that forwards every write to `parent`.
    #[must_use]
    pub fn with_parent(capacity: usize, parent: &Arc<dyn MessageSink>) -> Self {
        Self {
            capacity,
            contacts: Mutex::new(HashMap::new()),
            parent: Some(Arc::downgrade(parent)),
        }
    }

    /// Create an empty log for `contact` if none exists.
    ///
    /// Returns `true` if the log was newly created.
    pub fn add_contact(&self, contact: &str) -> bool {
        let mut contacts = self.contacts.lock();
        if contacts.contains_key(contact) {
            return false;
        }
        contacts.insert(contact.to_string(), ContactCache::new(self.capacity));
        true
    }

    /// Returns `true` if a log exists for `contact`.
    #[must_use]
    pub fn contains(&self, contact: &str) -> bool {
        self.contacts.lock().contains_key(contact)
    }

    /// Snapshot of the log for `contact`, or `None` if the contact is unknown.
    #[must_use]
    pub fn messages(&self, contact: &str) -> Option<Vec<String>> {
        self.contacts.lock().get(contact).map(ContactCache::messages)
    }

    /// Names of every contact with a log, in no particular order.
    #[must_use]
    pub fn contacts(&self) -> Vec<String> {
        self.contacts.lock().keys().cloned().collect()
    }

    /// Append to the local log only, without forwarding.
    fn record(&self, contact: &str, text: &str) -> bool {
        let mut contacts = self.contacts.lock();
        let log = contacts
            .entry(contact.to_string())
            .or_insert_with(|| ContactCache::new(self.capacity));
        if log.push(text) {
            tracing::info!(
                contact,
                capacity = self.capacity,
                "contact cache full, dropped oldest message"
            );
        }
        true
    }
}

impl MessageSink for MessageCache {
    fn save_message(&self, contact: &str, text: &str, display: bool) -> bool {
        let inserted = self.record(contact, text);
        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            // Parent outcome is not reported to the caller.
            parent.save_message(contact, text, display);
        }
        inserted
    }
}
