//! Cache configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// TTL cache settings, all in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
  /// Interval between expiry sweeps
  #[serde(default = "default_cleanup_interval")]
  pub cleanup_interval: u64,

  /// TTL for banner records
  #[serde(default = "default_banner_ttl")]
  pub banner_ttl: u64,

  /// TTL for aggregated stats responses
  #[serde(default = "default_stats_ttl")]
  pub stats_ttl: u64,
}

fn default_cleanup_interval() -> u64 {
  300 // 5 minutes
}

fn default_banner_ttl() -> u64 {
  3600
}

fn default_stats_ttl() -> u64 {
  900
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      cleanup_interval: default_cleanup_interval(),
      banner_ttl: default_banner_ttl(),
      stats_ttl: default_stats_ttl(),
    }
  }
}

impl CacheConfig {
  pub fn cleanup_interval(&self) -> Duration {
    Duration::from_secs(self.cleanup_interval)
  }

  pub fn banner_ttl(&self) -> Duration {
    Duration::from_secs(self.banner_ttl)
  }

  pub fn stats_ttl(&self) -> Duration {
    Duration::from_secs(self.stats_ttl)
  }

  pub fn validate(&self) -> Result<(), String> {
    if self.cleanup_interval == 0 {
      return Err("cache.cleanup_interval must be greater than zero".to_string());
    }
    if self.banner_ttl == 0 {
      return Err("cache.banner_ttl must be greater than zero".to_string());
    }
    if self.stats_ttl == 0 {
      return Err("cache.stats_ttl must be greater than zero".to_string());
    }
    Ok(())
  }
}
