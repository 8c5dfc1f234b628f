//! Namespaced filesystem blob store.
//!
//! One file per canonical key, all under the cache's own directory. Freshness
//! and expiration are not this layer's concern; it only moves bytes.

use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Blob store rooted at a single namespace directory.
#[derive(Debug, Clone)]
pub struct BlobStorage {
  dir: PathBuf,
}

impl BlobStorage {
  /// Open the store, creating its directory if missing.
  pub fn open(dir: &Path) -> Result<Self> {
    fs::create_dir_all(dir)
      .map_err(|e| eyre!("Failed to create blob directory {}: {}", dir.display(), e))?;

    Ok(Self {
      dir: dir.to_path_buf(),
    })
  }

  fn blob_path(&self, key: &str) -> PathBuf {
    self.dir.join(key)
  }

  /// Write a blob, overwriting any existing one for the key.
  pub fn put(&self, key: &str, content: &[u8]) -> Result<()> {
    fs::write(self.blob_path(key), content)
      .map_err(|e| eyre!("Failed to write blob {}: {}", key, e))
  }

  /// Read a blob. An absent blob is `None`; any other I/O failure propagates.
  pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
    match fs::read(self.blob_path(key)) {
      Ok(content) => Ok(Some(content)),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
      Err(e) => Err(eyre!("Failed to read blob {}: {}", key, e)),
    }
  }

  /// Delete a blob. Deleting an absent blob is not an error.
  pub fn delete(&self, key: &str) -> Result<()> {
    match fs::remove_file(self.blob_path(key)) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
      Err(e) => Err(eyre!("Failed to delete blob {}: {}", key, e)),
    }
  }

  /// Keys of every blob currently in the namespace.
  pub fn list(&self) -> Result<BTreeSet<String>> {
    let entries = fs::read_dir(&self.dir)
      .map_err(|e| eyre!("Failed to list blob directory {}: {}", self.dir.display(), e))?;

    let mut keys = BTreeSet::new();
    for entry in entries {
      let entry = entry.map_err(|e| eyre!("Failed to read blob directory entry: {}", e))?;
      if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
        keys.insert(entry.file_name().to_string_lossy().into_owned());
      }
    }

    Ok(keys)
  }

  /// Delete every blob in the namespace. Idempotent.
  pub fn clear(&self) -> Result<()> {
    for key in self.list()? {
      self.delete(&key)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn open_storage(dir: &TempDir) -> BlobStorage {
    BlobStorage::open(&dir.path().join("blobs")).expect("Failed to open storage")
  }

  #[test]
  fn test_put_then_get_round_trips() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir);

    storage.put("k1", b"payload").unwrap();

    assert_eq!(storage.get("k1").unwrap(), Some(b"payload".to_vec()));
  }

  #[test]
  fn test_get_absent_key_is_none() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir);

    assert_eq!(storage.get("missing").unwrap(), None);
  }

  #[test]
  fn test_put_overwrites_existing_blob() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir);

    storage.put("k1", b"first").unwrap();
    storage.put("k1", b"second").unwrap();

    assert_eq!(storage.get("k1").unwrap(), Some(b"second".to_vec()));
  }

  #[test]
  fn test_delete_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir);

    storage.put("k1", b"payload").unwrap();
    storage.delete("k1").unwrap();
    storage.delete("k1").unwrap();

    assert_eq!(storage.get("k1").unwrap(), None);
  }

  #[test]
  fn test_list_returns_all_keys() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir);

    storage.put("a", b"1").unwrap();
    storage.put("b", b"2").unwrap();
    storage.put("c", b"3").unwrap();

    let keys = storage.list().unwrap();
    assert_eq!(keys.len(), 3);
    assert!(keys.contains("a"));
    assert!(keys.contains("b"));
    assert!(keys.contains("c"));
  }

  #[test]
  fn test_clear_removes_every_blob() {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir);

    storage.put("a", b"1").unwrap();
    storage.put("b", b"2").unwrap();
    storage.clear().unwrap();
    storage.clear().unwrap();

    assert!(storage.list().unwrap().is_empty());
  }

  #[test]
  fn test_namespaces_do_not_share_blobs() {
    let dir = TempDir::new().unwrap();
    let alpha = BlobStorage::open(&dir.path().join("alpha")).unwrap();
    let beta = BlobStorage::open(&dir.path().join("beta")).unwrap();

    alpha.put("k1", b"alpha").unwrap();

    assert_eq!(beta.get("k1").unwrap(), None);
    assert!(beta.list().unwrap().is_empty());
  }
}
