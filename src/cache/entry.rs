//! Cache entry types

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// A cached value with its absolute expiry
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub value: CacheValue,
  pub expires_at: Instant,
}

impl CacheEntry {
  pub fn new(value: CacheValue, ttl: Duration) -> Self {
    Self {
      value,
      expires_at: Instant::now() + ttl,
    }
  }

  /// Logically absent once the deadline has strictly passed
  pub fn is_expired_at(&self, now: Instant) -> bool {
    now > self.expires_at
  }

  pub fn is_expired(&self) -> bool {
    self.is_expired_at(Instant::now())
  }

  pub fn ttl_remaining(&self) -> Option<Duration> {
    self.expires_at.checked_duration_since(Instant::now())
  }
}

/// Values the store can hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CacheValue {
  Integer(i64),
  Text(String),
  Json(serde_json::Value),
}

impl CacheValue {
  pub fn kind(&self) -> &'static str {
    match self {
      CacheValue::Integer(_) => "integer",
      CacheValue::Text(_) => "text",
      CacheValue::Json(_) => "json",
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      CacheValue::Integer(i) => Some(*i),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      CacheValue::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_json(&self) -> Option<&serde_json::Value> {
    match self {
      CacheValue::Json(v) => Some(v),
      _ => None,
    }
  }
}

impl From<i64> for CacheValue {
  fn from(i: i64) -> Self {
    CacheValue::Integer(i)
  }
}

impl From<String> for CacheValue {
  fn from(s: String) -> Self {
    CacheValue::Text(s)
  }
}

impl From<&str> for CacheValue {
  fn from(s: &str) -> Self {
    CacheValue::Text(s.to_string())
  }
}

impl From<serde_json::Value> for CacheValue {
  fn from(v: serde_json::Value) -> Self {
    CacheValue::Json(v)
  }
}
