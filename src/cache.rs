//! Fetch orchestration: lookup, expiration, miss delegation, write-back.
//!
//! One coarse lock per cache instance guards the index and blob store
//! together; every read-then-mutate sequence (lookup with expiration check,
//! put with eviction, invalidate, clear) runs entirely under it. The network
//! fetch itself always runs outside the lock.

use chrono::{Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::evict::EvictionPolicy;
use crate::fetcher::{FetchOutcome, Fetcher};
use crate::index::MetadataIndex;
use crate::key::KeyDeriver;
use crate::stats::{CacheStats, Snapshot};
use crate::storage::BlobStorage;

/// Index and blob store for one namespace, guarded as a unit.
struct StoreState {
  index: MetadataIndex,
  storage: BlobStorage,
}

/// A bounded, time-expiring fetch-through cache.
///
/// Cloning is cheap and every clone shares the same underlying state; two
/// caches built with different names never contend with each other.
#[derive(Clone)]
pub struct Cache {
  keys: KeyDeriver,
  expiration: Duration,
  policy: EvictionPolicy,
  state: Arc<Mutex<StoreState>>,
  stats: Arc<CacheStats>,
  fetcher: Arc<dyn Fetcher>,
}

impl Cache {
  /// Open a cache instance, creating its storage directory and index
  /// database if they do not exist yet.
  pub fn new(config: CacheConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
    config.validate()?;

    let dir = config.cache_dir()?;
    let index = MetadataIndex::open(&dir.join("index.db"))?;
    let storage = BlobStorage::open(&dir.join("blobs"))?;

    Ok(Self {
      keys: KeyDeriver::new(&config.name),
      expiration: config.expiration,
      policy: EvictionPolicy::new(config.capacity),
      state: Arc::new(Mutex::new(StoreState { index, storage })),
      stats: Arc::new(CacheStats::default()),
      fetcher,
    })
  }

  /// Fetch a resource through the cache.
  ///
  /// Returns a single-shot receiver that resolves to exactly one
  /// [`FetchOutcome`], always delivered from a spawned task — a cache hit is
  /// never completed inline on the caller. Must be called within a tokio
  /// runtime.
  pub fn fetch(&self, address: &str) -> oneshot::Receiver<FetchOutcome> {
    self.stats.record_call();

    let (tx, rx) = oneshot::channel();
    let cache = self.clone();
    let address = address.to_string();

    tokio::spawn(async move {
      let outcome = cache.run_fetch(&address).await;
      // Receiver may have been dropped; nothing to do then.
      let _ = tx.send(outcome);
    });

    rx
  }

  async fn run_fetch(&self, address: &str) -> FetchOutcome {
    let key = self.keys.derive(address);

    match self.lookup(&key) {
      Ok(Some(content)) => {
        debug!(key = %key, "cache hit");
        return FetchOutcome::Success(content);
      }
      Ok(None) => debug!(key = %key, "cache miss"),
      Err(report) => return FetchOutcome::Failure(report),
    }

    // Miss path: delegate to the fetcher, outside the lock.
    match self.fetcher.fetch(address).await {
      FetchOutcome::Success(content) => match self.store(&key, &content) {
        Ok(()) => FetchOutcome::Success(content),
        Err(report) => FetchOutcome::Failure(report),
      },
      other => other,
    }
  }

  /// Look the key up, purging it if expired. Counts the hit or miss.
  fn lookup(&self, key: &str) -> Result<Option<Vec<u8>>> {
    let state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let Some(last_update) = state.index.get(key)? else {
      self.stats.record_miss();
      return Ok(None);
    };

    if Utc::now() - last_update > self.expiration {
      state.storage.delete(key)?;
      state.index.remove(key)?;
      self.stats.record_expiration();
      self.stats.record_miss();
      debug!(key = %key, last_update = %last_update, "entry expired");
      return Ok(None);
    }

    match state.storage.get(key)? {
      Some(content) => {
        self.stats.record_hit();
        Ok(Some(content))
      }
      None => {
        // Indexed but the blob is gone. Drop the stale half and miss.
        state.index.remove(key)?;
        self.stats.record_miss();
        warn!(key = %key, "dropped index entry with no blob");
        Ok(None)
      }
    }
  }

  /// Write fetched content back, evicting first if the key is new and the
  /// cache is at capacity.
  fn store(&self, key: &str, content: &[u8]) -> Result<()> {
    let state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if state.index.get(key)?.is_none() {
      self
        .policy
        .make_room(&state.index, &state.storage, &self.stats)?;
    }

    state.storage.put(key, content)?;
    state.index.set(key, Utc::now())?;

    Ok(())
  }

  /// Drop the entry for an address. Absence of the blob, the index entry, or
  /// both is not an error.
  pub fn invalidate(&self, address: &str) -> Result<()> {
    let key = self.keys.derive(address);
    let state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    state.storage.delete(&key)?;
    state.index.remove(&key)?;

    Ok(())
  }

  /// Drop every entry in this cache's namespace. Idempotent.
  pub fn clear(&self) -> Result<()> {
    let state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    state.storage.clear()?;
    state.index.clear()?;

    Ok(())
  }

  /// Snapshot of the running counters plus the current resident count.
  pub fn stats(&self) -> Result<Snapshot> {
    let state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let resident = state.index.count()?;
    Ok(self.stats.snapshot(resident))
  }

  /// Hand a stats snapshot to `report` on a fixed interval until the
  /// returned task is aborted. The reporting cadence lives outside the
  /// cache; this only drives the ticks.
  pub fn spawn_stats_reporter<F>(
    &self,
    interval: std::time::Duration,
    mut report: F,
  ) -> tokio::task::JoinHandle<()>
  where
    F: FnMut(Snapshot) + Send + 'static,
  {
    let cache = self.clone();

    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.tick().await; // First tick completes immediately
      loop {
        ticker.tick().await;
        match cache.stats() {
          Ok(snapshot) => report(snapshot),
          Err(e) => warn!("Failed to snapshot cache stats: {}", e),
        }
      }
    })
  }
}
