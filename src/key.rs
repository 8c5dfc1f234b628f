//! Canonical key derivation for request addresses.
//!
//! Two addresses that differ only in a volatile query parameter (an API key,
//! a signature) describe the same logical resource and must map to the same
//! stored entry. Everything else that distinguishes a request keeps the keys
//! distinct.

use sha2::{Digest, Sha256};
use url::Url;

/// Query parameters stripped before derivation, matched case-insensitively.
const VOLATILE_PARAMS: &[&str] = &["key", "apikey", "api_key", "token", "signature"];

/// Longest key we are willing to use as a filename. Anything longer collapses
/// to a SHA-256 digest of the canonical form.
const MAX_KEY_LEN: usize = 200;

/// Derives storage-safe canonical keys, namespaced under a cache name.
#[derive(Debug, Clone)]
pub struct KeyDeriver {
  namespace: String,
  excluded: Vec<String>,
}

impl KeyDeriver {
  /// Create a deriver for the given namespace with the default volatile
  /// parameter set.
  pub fn new(namespace: &str) -> Self {
    Self {
      namespace: sanitize(namespace),
      excluded: VOLATILE_PARAMS.iter().map(|p| p.to_string()).collect(),
    }
  }

  /// Replace the set of query parameters stripped during derivation.
  #[allow(dead_code)]
  pub fn with_excluded_params<I, S>(mut self, params: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.excluded = params.into_iter().map(Into::into).collect();
    self
  }

  /// Derive the canonical key for a request address.
  ///
  /// Pure function of the address and this deriver's configuration: no I/O,
  /// no hidden state.
  pub fn derive(&self, address: &str) -> String {
    let canonical = match Url::parse(address) {
      Ok(url) => self.canonicalize(&url),
      // Not a parseable URL; the raw address is its own canonical form.
      Err(_) => address.to_string(),
    };

    let safe = sanitize(&canonical);
    if safe.len() > MAX_KEY_LEN {
      // SHA256 hash for stable, fixed-length keys
      let mut hasher = Sha256::new();
      hasher.update(canonical.as_bytes());
      format!("{}-{}", self.namespace, hex::encode(hasher.finalize()))
    } else {
      format!("{}-{}", self.namespace, safe)
    }
  }

  /// Rebuild the address without its volatile query parameters.
  fn canonicalize(&self, url: &Url) -> String {
    let mut out = String::new();
    out.push_str(url.scheme());
    out.push(':');
    if let Some(host) = url.host_str() {
      out.push_str(host);
    }
    if let Some(port) = url.port() {
      out.push(':');
      out.push_str(&port.to_string());
    }
    out.push_str(url.path());

    let kept: Vec<String> = url
      .query_pairs()
      .filter(|(name, _)| !self.is_excluded(name))
      .map(|(name, value)| format!("{}={}", name, value))
      .collect();

    if !kept.is_empty() {
      out.push('?');
      out.push_str(&kept.join("&"));
    }

    out
  }

  fn is_excluded(&self, name: &str) -> bool {
    self.excluded.iter().any(|p| p.eq_ignore_ascii_case(name))
  }
}

/// Replace path-breaking characters with a safe substitute.
fn sanitize(input: &str) -> String {
  input
    .chars()
    .map(|c| match c {
      'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '.' | '_' => c,
      _ => '_',
    })
    .collect()
}
