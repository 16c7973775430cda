use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Optional request metadata recorded alongside a click
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickMetadata {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_ip: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_agent: Option<String>,
}

impl ClickMetadata {
  pub fn new(user_ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
    Self {
      user_ip: non_empty(user_ip.into()),
      user_agent: non_empty(user_agent.into()),
    }
  }
}

fn non_empty(s: String) -> Option<String> {
  if s.is_empty() {
    None
  } else {
    Some(s)
  }
}

/// A single accepted click against a banner.
///
/// Fields are private so a click can only be built through [`Click::new`],
/// which enforces `banner_id > 0` and stamps the acquisition time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Click {
  banner_id: i64,
  timestamp: DateTime<Utc>,
  #[serde(flatten)]
  metadata: ClickMetadata,
}

impl Click {
  pub fn new(banner_id: i64, metadata: ClickMetadata) -> Result<Self, InvalidBannerId> {
    Self::at(banner_id, Utc::now(), metadata)
  }

  /// Build a click with an explicit timestamp (used by backfills and tests)
  pub fn at(
    banner_id: i64,
    timestamp: DateTime<Utc>,
    metadata: ClickMetadata,
  ) -> Result<Self, InvalidBannerId> {
    if banner_id <= 0 {
      return Err(InvalidBannerId(banner_id));
    }
    Ok(Self {
      banner_id,
      timestamp,
      metadata,
    })
  }

  pub fn banner_id(&self) -> i64 {
    self.banner_id
  }

  pub fn timestamp(&self) -> DateTime<Utc> {
    self.timestamp
  }

  pub fn user_ip(&self) -> Option<&str> {
    self.metadata.user_ip.as_deref()
  }

  pub fn user_agent(&self) -> Option<&str> {
    self.metadata.user_agent.as_deref()
  }

  /// Timestamp truncated to the minute bucket this click aggregates into
  pub fn minute(&self) -> DateTime<Utc> {
    truncate_to_minute(self.timestamp)
  }
}

/// Rejected banner identifier (must be positive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid banner ID: {0}")]
pub struct InvalidBannerId(pub i64);

pub fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
  ts.duration_trunc(TimeDelta::minutes(1)).unwrap_or(ts)
}
