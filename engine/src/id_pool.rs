//! Human-readable session ID generation and the process-wide ID pool.
//!
//! Format `word-word` or `word-word-N` (N=2..9); falls back to
//! `shell-<base36-timestamp>` after 20 failed slug attempts (spec.md §3).
//! Mutations to the pool are only ever performed by `SessionRegistry`
//! (spec.md §5: "ID pool is a process-global set; keep all mutations
//! behind the registry's serial dispatch to avoid the need for locks").

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

const ADJECTIVES: &[&str] = &[
    "swift", "calm", "bright", "quiet", "bold", "mellow", "brisk", "eager",
    "keen", "lucid", "nimble", "plucky", "sturdy", "tidy", "vivid", "wry",
    "amber", "coral", "dusty", "hollow", "jagged", "lively", "mossy", "rustic",
];

const NOUNS: &[&str] = &[
    "falcon", "otter", "cedar", "harbor", "meadow", "ridge", "willow", "comet",
    "lantern", "thicket", "brook", "canyon", "ember", "grove", "heron", "prairie",
    "summit", "tundra", "viper", "zephyr", "atlas", "basalt", "cinder", "delta",
];

/// A process-global pool of human-readable slugs handed out to sessions.
///
/// Owns the set of in-use IDs. `SessionRegistry` is the only caller; it
/// holds the pool behind its own serial dispatch, so no internal locking
/// is needed here.
#[derive(Default)]
pub struct IdPool {
    in_use: HashSet<String>,
}

impl IdPool {
    pub fn new() -> Self {
        Self { in_use: HashSet::new() }
    }

    /// True while `id` is reserved (spec.md invariant: "SessionId is in
    /// the pool iff no live entry exists in any of the four maps" — the
    /// registry is responsible for calling `release` exactly when the
    /// last consumer of an id is gone).
    pub fn is_reserved(&self, id: &str) -> bool {
        self.in_use.contains(id)
    }

    /// Reserve a specific id (used by `add_background_with_id`). Returns
    /// `false` if already reserved — callers must treat that as a
    /// collision, not silently overwrite.
    pub fn reserve(&mut self, id: &str) -> bool {
        self.in_use.insert(id.to_string())
    }

    /// Release an id back to the pool. A no-op if not reserved.
    pub fn release(&mut self, id: &str) {
        self.in_use.remove(id);
    }

    /// Generate and reserve a fresh, collision-free id.
    pub fn generate(&mut self) -> String {
        for attempt in 0..20 {
            let candidate = Self::slug_for_attempt(attempt);
            if self.reserve(&candidate) {
                return candidate;
            }
        }
        let fallback = format!("shell-{}", Self::base36_timestamp());
        // The fallback itself could theoretically collide under pathological
        // clock behavior; loop until it doesn't rather than silently reuse.
        let mut candidate = fallback;
        let mut suffix = 2u32;
        while !self.reserve(&candidate) {
            candidate = format!("shell-{}-{}", Self::base36_timestamp(), suffix);
            suffix += 1;
        }
        candidate
    }

    fn slug_for_attempt(attempt: u32) -> String {
        let idx = attempt as usize;
        let adj = ADJECTIVES[idx % ADJECTIVES.len()];
        let noun = NOUNS[(idx / ADJECTIVES.len()) % NOUNS.len()];
        if attempt < 2 {
            format!("{adj}-{noun}")
        } else {
            // N ranges 2..9 per spec; beyond that we've already moved on to
            // a different adjective/noun pair via the index arithmetic above.
            let n = (attempt % 8) + 2;
            format!("{adj}-{noun}-{n}")
        }
    }

    fn base36_timestamp() -> String {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        to_base36(secs)
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_word_word_slugs() {
        let mut pool = IdPool::new();
        let id = pool.generate();
        assert!(id.split('-').count() >= 2);
        assert!(pool.is_reserved(&id));
    }

    #[test]
    fn collisions_get_numeric_suffix_or_new_pair() {
        let mut pool = IdPool::new();
        let mut seen = HashSet::new();
        for _ in 0..50 {
            let id = pool.generate();
            assert!(seen.insert(id.clone()), "duplicate id generated: {id}");
        }
    }

    #[test]
    fn release_then_reserve_same_id_is_legal() {
        let mut pool = IdPool::new();
        let id = pool.generate();
        pool.release(&id);
        assert!(!pool.is_reserved(&id));
        assert!(pool.reserve(&id));
    }

    #[test]
    fn at_most_one_live_entry_per_id() {
        let mut pool = IdPool::new();
        assert!(pool.reserve("swift-falcon"));
        assert!(!pool.reserve("swift-falcon"));
    }
}
