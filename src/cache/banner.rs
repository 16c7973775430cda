use std::sync::Arc;
use std::time::Duration;

use super::entry::CacheValue;
use super::error::CacheError;
use super::store::InMemoryCacheStore;
use crate::types::Banner;

const KEY_PREFIX: &str = "banner:";

/// Banner records keyed by id
#[derive(Clone)]
pub struct BannerCache {
  store: Arc<InMemoryCacheStore>,
  ttl: Duration,
}

impl BannerCache {
  pub fn new(store: Arc<InMemoryCacheStore>, ttl: Duration) -> Self {
    Self { store, ttl }
  }

  pub fn key(banner_id: i64) -> String {
    format!("{}{}", KEY_PREFIX, banner_id)
  }

  pub fn get(&self, banner_id: i64) -> Result<Banner, CacheError> {
    match self.store.get(&Self::key(banner_id))? {
      CacheValue::Json(v) => Ok(serde_json::from_value(v)?),
      other => Err(CacheError::TypeMismatch {
        expected: "json",
        found: other.kind(),
      }),
    }
  }

  pub fn set(&self, banner: &Banner) -> Result<(), CacheError> {
    let value = serde_json::to_value(banner)?;
    self
      .store
      .set(&Self::key(banner.id), CacheValue::Json(value), self.ttl);
    Ok(())
  }

  pub fn delete(&self, banner_id: i64) -> bool {
    self.store.delete(&Self::key(banner_id))
  }

  /// Drop every banner entry. Scans the whole store.
  pub fn clear(&self) -> usize {
    self
      .store
      .keys(KEY_PREFIX)
      .iter()
      .filter(|k| self.store.delete(k))
      .count()
  }
}
