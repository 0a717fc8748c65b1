//! Per-prefix sequential identifier generation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;

/// Hands out monotonically increasing identifiers, one counter per prefix.
///
/// Identifiers look like `<prefix><yyMMdd><10-digit sequence>`. Each prefix
/// owns an independent atomic counter; creating a counter for a new prefix
/// takes a short write lock, every later increment is lock-free.
#[derive(Debug, Clone, Default)]
pub struct PrefixCounter {
    counters: Arc<RwLock<HashMap<String, Arc<AtomicU64>>>>,
}

impl PrefixCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next identifier for `prefix`.
    pub fn next_id(&self, prefix: &str) -> String {
        let seq = self.counter(prefix).fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}{}{seq:010}", Utc::now().format("%y%m%d"))
    }

    /// Returns the last sequence number handed out for `prefix`.
    pub fn current(&self, prefix: &str) -> u64 {
        self.counters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(prefix)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn counter(&self, prefix: &str) -> Arc<AtomicU64> {
        if let Some(counter) = self
            .counters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(prefix)
        {
            return counter.clone();
        }

        self.counters
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(prefix.to_string())
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential_per_prefix() {
        let counter = PrefixCounter::new();
        let a = counter.next_id("BC");
        let b = counter.next_id("BC");

        assert!(a.starts_with("BC"));
        assert!(a.ends_with("0000000001"));
        assert!(b.ends_with("0000000002"));
        assert_eq!(counter.current("BC"), 2);
    }

    #[test]
    fn test_prefixes_are_independent() {
        let counter = PrefixCounter::new();
        counter.next_id("BC");
        counter.next_id("BC");
        let tu = counter.next_id("TU");

        assert!(tu.ends_with("0000000001"));
        assert_eq!(counter.current("BC"), 2);
        assert_eq!(counter.current("XX"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_generation_has_no_duplicates() {
        let counter = PrefixCounter::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                (0..100).map(|_| counter.next_id("WB")).collect::<Vec<_>>()
            }));
        }

        let mut all = std::collections::HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 800);
    }
}
