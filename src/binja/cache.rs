//! Cache keys for upstream requests.

use sha2::{Digest, Sha256};

use crate::cache::QueryKey;

use super::request::RequestDescriptor;

impl QueryKey for RequestDescriptor {
  /// Keyed by endpoint and sorted parameters only. The verb is left out:
  /// only GET list requests are ever cached.
  fn cache_hash(&self) -> String {
    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(self.canonical().as_bytes());
    hex::encode(hasher.finalize())
  }

  fn description(&self) -> String {
    format!("{} {}", self.method(), self.canonical())
  }
}
