use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::entry::CacheValue;
use super::error::CacheError;
use super::store::InMemoryCacheStore;
use crate::types::StatsResponse;

const KEY_PREFIX: &str = "stats:";

/// Aggregated responses keyed by banner and exact period (second granularity)
#[derive(Clone)]
pub struct StatsCache {
  store: Arc<InMemoryCacheStore>,
  ttl: Duration,
}

impl StatsCache {
  pub fn new(store: Arc<InMemoryCacheStore>, ttl: Duration) -> Self {
    Self { store, ttl }
  }

  pub fn key(banner_id: i64, from: DateTime<Utc>, to: DateTime<Utc>) -> String {
    format!(
      "{}{}:{}:{}",
      KEY_PREFIX,
      banner_id,
      from.timestamp(),
      to.timestamp()
    )
  }

  pub fn get(
    &self,
    banner_id: i64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
  ) -> Result<StatsResponse, CacheError> {
    match self.store.get(&Self::key(banner_id, from, to))? {
      CacheValue::Json(v) => Ok(serde_json::from_value(v)?),
      other => Err(CacheError::TypeMismatch {
        expected: "json",
        found: other.kind(),
      }),
    }
  }

  /// Cache a response under its own banner id and period
  pub fn set(&self, response: &StatsResponse) -> Result<(), CacheError> {
    let key = Self::key(response.banner_id, response.period.from, response.period.to);
    let value = serde_json::to_value(response)?;
    self.store.set(&key, CacheValue::Json(value), self.ttl);
    Ok(())
  }

  pub fn delete(&self, banner_id: i64, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    self.store.delete(&Self::key(banner_id, from, to))
  }

  pub fn clear(&self) -> usize {
    self
      .store
      .keys(KEY_PREFIX)
      .iter()
      .filter(|k| self.store.delete(k))
      .count()
  }
}
