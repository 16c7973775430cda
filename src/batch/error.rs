use thiserror::Error;

use crate::types::InvalidBannerId;

#[derive(Debug, Error)]
pub enum ClickError {
  #[error("invalid banner ID: {0}")]
  InvalidIdentifier(i64),

  /// The sink rejected a batch. Those clicks are not re-queued.
  #[error("failed to persist {dropped} clicks: {source}")]
  SinkFailure {
    dropped: usize,
    #[source]
    source: anyhow::Error,
  },
}

impl From<InvalidBannerId> for ClickError {
  fn from(e: InvalidBannerId) -> Self {
    ClickError::InvalidIdentifier(e.0)
  }
}
