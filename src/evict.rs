//! Capacity-bounded eviction.
//!
//! Eviction ordering follows write recency: the entry whose last write is
//! oldest goes first, regardless of how often it has been read since. A hot
//! entry that never gets re-fetched is still the first to leave.

use color_eyre::Result;
use tracing::{debug, warn};

use crate::index::MetadataIndex;
use crate::stats::CacheStats;
use crate::storage::BlobStorage;

/// Decides whether an insert must first remove a resident entry.
#[derive(Debug, Clone, Copy)]
pub struct EvictionPolicy {
  capacity: usize,
}

impl EvictionPolicy {
  pub fn new(capacity: usize) -> Self {
    Self { capacity }
  }

  /// Make room for one incoming non-resident key.
  ///
  /// Reconciles storage against the index first: a blob with no index entry
  /// is orphaned state from an interrupted write and is deleted outright,
  /// without touching the eviction counter. Then, while the index is at
  /// capacity, the entry with the oldest last-write timestamp is removed.
  /// Normally that is a single removal; the loop only matters when the
  /// configured capacity shrank since the entries were written.
  pub fn make_room(
    &self,
    index: &MetadataIndex,
    storage: &BlobStorage,
    stats: &CacheStats,
  ) -> Result<()> {
    self.reconcile(index, storage)?;

    while index.count()? >= self.capacity {
      let Some((key, last_update)) = index.oldest()? else {
        break;
      };

      storage.delete(&key)?;
      index.remove(&key)?;
      stats.record_eviction();
      debug!(key = %key, last_update = %last_update, "evicted oldest entry");
    }

    Ok(())
  }

  /// Delete blobs that have no corresponding index entry.
  fn reconcile(&self, index: &MetadataIndex, storage: &BlobStorage) -> Result<()> {
    let blobs = storage.list()?;
    if blobs.len() <= index.count()? {
      return Ok(());
    }

    let indexed = index.keys()?;
    for key in blobs.difference(&indexed) {
      storage.delete(key)?;
      warn!(key = %key, "deleted orphaned blob with no index entry");
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, TimeZone, Utc};
  use tempfile::TempDir;

  fn components(dir: &TempDir) -> (MetadataIndex, BlobStorage, CacheStats) {
    let index = MetadataIndex::open(&dir.path().join("index.db")).unwrap();
    let storage = BlobStorage::open(&dir.path().join("blobs")).unwrap();
    (index, storage, CacheStats::default())
  }

  fn insert(index: &MetadataIndex, storage: &BlobStorage, key: &str, age_secs: i64) {
    let stamp = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap() + Duration::seconds(age_secs);
    storage.put(key, key.as_bytes()).unwrap();
    index.set(key, stamp).unwrap();
  }

  #[test]
  fn test_below_capacity_removes_nothing() {
    let dir = TempDir::new().unwrap();
    let (index, storage, stats) = components(&dir);
    insert(&index, &storage, "a", 0);

    EvictionPolicy::new(2)
      .make_room(&index, &storage, &stats)
      .unwrap();

    assert_eq!(index.count().unwrap(), 1);
    assert_eq!(stats.snapshot(1).evictions, 0);
  }

  #[test]
  fn test_at_capacity_evicts_oldest_write() {
    let dir = TempDir::new().unwrap();
    let (index, storage, stats) = components(&dir);
    insert(&index, &storage, "old", 0);
    insert(&index, &storage, "new", 10);

    EvictionPolicy::new(2)
      .make_room(&index, &storage, &stats)
      .unwrap();

    assert_eq!(index.get("old").unwrap(), None);
    assert_eq!(storage.get("old").unwrap(), None);
    assert!(index.get("new").unwrap().is_some());
    assert_eq!(stats.snapshot(1).evictions, 1);
  }

  #[test]
  fn test_orphaned_blob_is_repaired_not_evicted() {
    let dir = TempDir::new().unwrap();
    let (index, storage, stats) = components(&dir);
    insert(&index, &storage, "a", 0);
    // Blob with no index entry, as left behind by an interrupted write
    storage.put("orphan", b"stale").unwrap();

    EvictionPolicy::new(2)
      .make_room(&index, &storage, &stats)
      .unwrap();

    assert_eq!(storage.get("orphan").unwrap(), None);
    assert!(index.get("a").unwrap().is_some());
    assert_eq!(stats.snapshot(1).evictions, 0);
  }

  #[test]
  fn test_shrunk_capacity_evicts_until_room_exists() {
    let dir = TempDir::new().unwrap();
    let (index, storage, stats) = components(&dir);
    insert(&index, &storage, "a", 0);
    insert(&index, &storage, "b", 1);
    insert(&index, &storage, "c", 2);

    EvictionPolicy::new(2)
      .make_room(&index, &storage, &stats)
      .unwrap();

    // Room for one incoming entry under the new capacity
    assert_eq!(index.count().unwrap(), 1);
    assert!(index.get("c").unwrap().is_some());
    assert_eq!(stats.snapshot(1).evictions, 2);
  }
}
