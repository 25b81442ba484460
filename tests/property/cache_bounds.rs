//! Property-based tests for cache bounds and eviction order.
//!
//! Uses proptest to verify:
//! 1. A contact log never holds more than capacity + 1 entries.
//! 2. Whatever survives is the newest suffix of what was written, in order.
//! 3. Every write to the private and shared caches reaches the screen feed,
//!    which obeys the same bound.

use proptest::prelude::*;
use relaychat::cache::hierarchy::{BROADCAST_ALIAS, CacheCapacities, CacheHierarchy};
use relaychat::cache::{ContactCache, MessageCache, MessageSink};
use relaychat::console::Console;

/// One write into the hierarchy: `Some(peer)` for private, `None` for shared.
fn arb_writes() -> impl Strategy<Value = Vec<(Option<u8>, String)>> {
    prop::collection::vec(
        (prop::option::of(0u8..4), "[a-z]{1,12}"),
        0..120,
    )
}

proptest! {
    #[test]
    fn contact_log_never_exceeds_capacity_plus_one(
        capacity in 0usize..16,
        texts in prop::collection::vec("[a-z0-9]{1,8}", 0..64),
    ) {
        let mut log = ContactCache::new(capacity);
        for text in &texts {
            log.push(text);
            prop_assert!(log.len() <= capacity + 1);
        }
        prop_assert_eq!(log.len(), texts.len().min(capacity + 1));
    }

    #[test]
    fn eviction_keeps_the_newest_suffix(
        capacity in 1usize..16,
        count in 0usize..64,
    ) {
        let cache = MessageCache::new(capacity);
        let texts: Vec<String> = (0..count).map(|i| format!("m{i}")).collect();
        for text in &texts {
            prop_assert!(cache.save_message("bob", text, false));
        }
        let kept = cache.messages("bob").unwrap_or_default();
        let expected = &texts[texts.len() - kept.len()..];
        prop_assert_eq!(kept.as_slice(), expected);
    }

    #[test]
    fn screen_feed_conflates_every_write(
        private_cap in 1usize..8,
        shared_cap in 1usize..8,
        screen_cap in 1usize..32,
        writes in arb_writes(),
    ) {
        let (console, _capture) = Console::capture();
        let caches = CacheHierarchy::new(
            "alice",
            CacheCapacities { private: private_cap, shared: shared_cap, screen: screen_cap },
            console,
        );

        let mut written = Vec::new();
        for (i, (peer, text)) in writes.iter().enumerate() {
            let line = format!("{i}:{text}");
            match peer {
                Some(p) => caches.private().save_message(&format!("peer{p}"), &line, false),
                None => caches.shared().save_message(BROADCAST_ALIAS, &line, false),
            };
            written.push(line);
        }

        let feed = caches.screen().feed();
        prop_assert!(feed.len() <= screen_cap + 1);
        prop_assert_eq!(feed.as_slice(), &written[written.len() - feed.len()..]);

        for peer in caches.private().contacts() {
            let log = caches.private().messages(&peer).unwrap_or_default();
            prop_assert!(log.len() <= private_cap + 1);
        }
        let shared = caches.shared().messages(BROADCAST_ALIAS).unwrap_or_default();
        prop_assert!(shared.len() <= shared_cap + 1);
    }
}
