use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::click::truncate_to_minute;

/// Longest period a stats query may span
pub const MAX_PERIOD_DAYS: i64 = 30;

/// Click count for one minute bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinuteStat {
  pub ts: DateTime<Utc>,
  pub v: i64,
}

impl MinuteStat {
  pub fn new(ts: DateTime<Utc>, v: i64) -> Self {
    Self {
      ts: truncate_to_minute(ts),
      v,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatPeriod {
  pub from: DateTime<Utc>,
  pub to: DateTime<Utc>,
}

impl StatPeriod {
  pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, PeriodError> {
    if from > to {
      return Err(PeriodError::Inverted);
    }
    if to - from > TimeDelta::days(MAX_PERIOD_DAYS) {
      return Err(PeriodError::TooLarge);
    }
    Ok(Self { from, to })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PeriodError {
  #[error("from time cannot be after to time")]
  Inverted,
  #[error("time period is too large, maximum allowed: {MAX_PERIOD_DAYS} days")]
  TooLarge,
}

/// Aggregated minute-bucketed counts for one banner over a period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsResponse {
  pub banner_id: i64,
  pub period: StatPeriod,
  pub stats: Vec<MinuteStat>,
  pub total: i64,
}

impl StatsResponse {
  /// Build a response with buckets sorted by time and the total derived
  pub fn new(banner_id: i64, period: StatPeriod, mut stats: Vec<MinuteStat>) -> Self {
    stats.sort_by_key(|s| s.ts);
    let total = stats.iter().map(|s| s.v).sum();
    Self {
      banner_id,
      period,
      stats,
      total,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn at(min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 12, 12, 10, min, 0).unwrap()
  }

  #[test]
  fn test_period_validation() {
    assert!(StatPeriod::new(at(0), at(5)).is_ok());
    assert!(StatPeriod::new(at(5), at(5)).is_ok());
    assert_eq!(StatPeriod::new(at(5), at(0)), Err(PeriodError::Inverted));

    let far = at(0) + TimeDelta::days(31);
    assert_eq!(StatPeriod::new(at(0), far), Err(PeriodError::TooLarge));
  }

  #[test]
  fn test_response_sorts_and_totals() {
    let period = StatPeriod::new(at(0), at(10)).unwrap();
    let resp = StatsResponse::new(
      3,
      period,
      vec![MinuteStat::new(at(4), 2), MinuteStat::new(at(1), 5)],
    );
    assert_eq!(resp.total, 7);
    assert_eq!(resp.stats[0].ts, at(1));
    assert_eq!(resp.stats[1].ts, at(4));
  }
}
