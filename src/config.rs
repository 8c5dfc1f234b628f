//! Cache instance configuration.

use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

/// Configuration for one cache instance. Immutable once the cache is built.
#[derive(Debug, Clone)]
pub struct CacheConfig {
  /// Namespace isolating this cache from others sharing the storage area.
  pub name: String,
  /// How long an entry stays fresh after its last write.
  pub expiration: Duration,
  /// Maximum number of resident entries.
  pub capacity: usize,
  /// Storage root; defaults to the platform data directory.
  pub root: Option<PathBuf>,
}

impl CacheConfig {
  pub fn new(name: impl Into<String>, expiration: Duration, capacity: usize) -> Self {
    Self {
      name: name.into(),
      expiration,
      capacity,
      root: None,
    }
  }

  /// Use an explicit storage root instead of the platform data directory.
  pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
    self.root = Some(root.into());
    self
  }

  pub fn validate(&self) -> Result<()> {
    if self.name.is_empty() {
      return Err(eyre!("Cache name must not be empty"));
    }
    if !self
      .name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
      return Err(eyre!(
        "Cache name '{}' contains characters unsafe for storage paths",
        self.name
      ));
    }
    if self.capacity == 0 {
      return Err(eyre!("Cache capacity must be at least 1"));
    }
    if self.expiration <= Duration::zero() {
      return Err(eyre!("Expiration period must be positive"));
    }
    Ok(())
  }

  /// Directory holding this cache's index and blobs.
  pub fn cache_dir(&self) -> Result<PathBuf> {
    let root = match &self.root {
      Some(root) => root.clone(),
      None => Self::default_root()?,
    };
    Ok(root.join(&self.name))
  }

  /// Default storage root under the platform data directory.
  fn default_root() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("fetchstash"))
  }
}
