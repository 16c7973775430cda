//! Cache error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
  /// Key absent or expired. This is control flow, not a failure.
  #[error("cache miss")]
  NotFound,

  #[error("type mismatch: expected {expected}, found {found}")]
  TypeMismatch {
    expected: &'static str,
    found: &'static str,
  },

  #[error("integer overflow")]
  Overflow,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl CacheError {
  pub fn is_miss(&self) -> bool {
    matches!(self, CacheError::NotFound)
  }
}
