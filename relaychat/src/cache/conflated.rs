//! Terminal-mirroring cache.
//!
//! Every write lands in a single log keyed by a fixed alias (the local
//! identity), whatever contact it was addressed to. Writes marked for
//! display reprint that whole log to the console.

use crate::cache::{MessageCache, MessageSink};
use crate::console::Console;

/// A [`MessageCache`] that conflates all contacts into one printable feed.
pub struct ConflatedCache {
    alias: String,
    inner: MessageCache,
    console: Console,
}

impl ConflatedCache {
    /// Create a root feed for `alias` with the given capacity.
    pub fn new(alias: impl Into<String>, capacity: usize, console: Console) -> Self {
        let alias = alias.into();
        let inner = MessageCache::new(capacity);
        inner.add_contact(&alias);
        Self {
            alias,
            inner,
            console,
        }
    }

    /// The alias every write is stored under.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Snapshot of the conflated feed, oldest first.
    #[must_use]
    pub fn feed(&self) -> Vec<String> {
        self.inner.messages(&self.alias).unwrap_or_default()
    }

    fn print_feed(&self) {
        self.console.blank();
        for message in self.feed() {
            self.console.line(&message);
        }
    }
}

impl MessageSink for ConflatedCache {
    fn save_message(&self, _contact: &str, text: &str, display: bool) -> bool {
        let accepted = self.inner.save_message(&self.alias, text, display);
        if accepted && display {
            self.print_feed();
        }
        accepted
    }
}
