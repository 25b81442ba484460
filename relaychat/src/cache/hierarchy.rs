//! Wiring of the three client caches.
//!
//! ```text
//!   private (per peer) ──┐
//!                        ├──> screen (conflated under local identity) ──> console
//!   shared (EVERYONE) ───┘
//! ```

use std::sync::Arc;

use crate::cache::conflated::ConflatedCache;
use crate::cache::{MessageCache, MessageSink};
use crate::console::Console;

/// Contact name under which broadcast messages are stored.
pub const BROADCAST_ALIAS: &str = "EVERYONE";

/// Capacities for each cache in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheCapacities {
    /// Per-peer private history.
    pub private: usize,
    /// Broadcast history.
    pub shared: usize,
    /// Conflated terminal feed.
    pub screen: usize,
}

impl Default for CacheCapacities {
    fn default() -> Self {
        Self {
            private: 200,
            shared: 600,
            screen: 1600,
        }
    }
}

/// Owner of the private, shared and screen caches.
pub struct CacheHierarchy {
    screen: Arc<ConflatedCache>,
    private: MessageCache,
    shared: MessageCache,
}

impl CacheHierarchy {
    /// Build the hierarchy for `identity`.
    pub fn new(identity: &str, capacities: CacheCapacities, console: Console) -> Self {
        let screen = Arc::new(ConflatedCache::new(identity, capacities.screen, console));
        let sink: Arc<dyn MessageSink> = screen.clone();
        let private = MessageCache::with_parent(capacities.private, &sink);
        let shared = MessageCache::with_parent(capacities.shared, &sink);
        shared.add_contact(BROADCAST_ALIAS);
        Self {
            screen,
            private,
            shared,
        }
    }

    /// Per-peer private history.
    #[must_use]
    pub const fn private(&self) -> &MessageCache {
        &self.private
    }

    /// Broadcast history.
    #[must_use]
    pub const fn shared(&self) -> &MessageCache {
        &self.shared
    }

    /// Conflated terminal feed.
    #[must_use]
    pub fn screen(&self) -> &ConflatedCache {
        &self.screen
    }
}
