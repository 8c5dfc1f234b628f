//! Running operational counters.
//!
//! Counters are advisory: they use relaxed atomics and make no consistency
//! promise under concurrent fetches. They never reset on their own.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters for one cache instance.
#[derive(Debug, Default)]
pub struct CacheStats {
  calls: AtomicU64,
  hits: AtomicU64,
  misses: AtomicU64,
  expirations: AtomicU64,
  evictions: AtomicU64,
}

impl CacheStats {
  pub fn record_call(&self) {
    self.calls.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_hit(&self) {
    self.hits.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_miss(&self) {
    self.misses.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_expiration(&self) {
    self.expirations.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_eviction(&self) {
    self.evictions.fetch_add(1, Ordering::Relaxed);
  }

  /// Snapshot the counters together with the current resident entry count.
  pub fn snapshot(&self, resident: usize) -> Snapshot {
    Snapshot {
      calls: self.calls.load(Ordering::Relaxed),
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      expirations: self.expirations.load(Ordering::Relaxed),
      evictions: self.evictions.load(Ordering::Relaxed),
      resident,
    }
  }
}

/// Point-in-time view of the counters, handed to external reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Snapshot {
  pub calls: u64,
  pub hits: u64,
  pub misses: u64,
  pub expirations: u64,
  pub evictions: u64,
  pub resident: usize,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_counters_accumulate() {
    let stats = CacheStats::default();

    stats.record_call();
    stats.record_call();
    stats.record_hit();
    stats.record_miss();
    stats.record_expiration();
    stats.record_eviction();

    let snapshot = stats.snapshot(3);
    assert_eq!(snapshot.calls, 2);
    assert_eq!(snapshot.hits, 1);
    assert_eq!(snapshot.misses, 1);
    assert_eq!(snapshot.expirations, 1);
    assert_eq!(snapshot.evictions, 1);
    assert_eq!(snapshot.resident, 3);
  }

  #[test]
  fn test_snapshot_does_not_reset_counters() {
    let stats = CacheStats::default();

    stats.record_call();
    let _ = stats.snapshot(0);
    stats.record_call();

    assert_eq!(stats.snapshot(0).calls, 2);
  }
}
