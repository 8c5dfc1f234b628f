//! A bounded, time-expiring fetch-through cache for idempotent network
//! requests, persisted to local storage.
//!
//! On a miss the cache delegates to a [`Fetcher`], stores the result, and
//! delivers it through a single-shot channel; repeated requests for the same
//! logical resource are served from disk until their write expires or they
//! are evicted to respect the capacity bound.
//!
//! # Example
//!
//! ```ignore
//! use chrono::Duration;
//! use fetchstash::{Cache, CacheConfig, HttpFetcher};
//! use std::sync::Arc;
//!
//! let config = CacheConfig::new("weather", Duration::hours(1), 100);
//! let cache = Cache::new(config, Arc::new(HttpFetcher::new()?))?;
//!
//! let outcome = cache.fetch("https://api.example.com/report?city=seattle").await?;
//! ```

mod cache;
mod config;
mod evict;
mod fetcher;
mod index;
mod key;
mod stats;
mod storage;

pub use cache::Cache;
pub use config::CacheConfig;
pub use fetcher::{FetchOutcome, Fetcher, HttpFetcher};
pub use stats::Snapshot;
