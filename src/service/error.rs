use thiserror::Error;

use crate::batch::ClickError;
use crate::types::PeriodError;

#[derive(Debug, Error)]
pub enum ServiceError {
  #[error("invalid banner ID: {0}")]
  InvalidIdentifier(i64),

  #[error("banner {0} not found")]
  BannerNotFound(i64),

  #[error(transparent)]
  InvalidPeriod(#[from] PeriodError),

  #[error(transparent)]
  Click(ClickError),

  #[error("backend error: {0}")]
  Backend(#[from] anyhow::Error),
}

impl From<ClickError> for ServiceError {
  fn from(e: ClickError) -> Self {
    match e {
      ClickError::InvalidIdentifier(id) => ServiceError::InvalidIdentifier(id),
      other => ServiceError::Click(other),
    }
  }
}
