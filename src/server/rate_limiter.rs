//! Per-client request rate limiting using a token bucket per IP address.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

use super::config::LimitsSection;

/// Buckets idle this long with full tokens are dropped by `cleanup`
const STALE_AFTER: Duration = Duration::from_secs(60);

pub struct RateLimiter {
  requests_per_second: u32,
  burst_size: u32,
  buckets: Mutex<HashMap<IpAddr, TokenBucket>>,
}

struct TokenBucket {
  tokens: f64,
  last_update: Instant,
  rate: f64,     // tokens per second
  capacity: f64, // max tokens (burst size)
}

impl TokenBucket {
  fn new(rate: u32, capacity: u32) -> Self {
    Self {
      tokens: capacity as f64,
      last_update: Instant::now(),
      rate: rate as f64,
      capacity: capacity as f64,
    }
  }

  fn try_consume(&mut self) -> bool {
    self.refill();
    if self.tokens >= 1.0 {
      self.tokens -= 1.0;
      true
    } else {
      false
    }
  }

  fn refill(&mut self) {
    let now = Instant::now();
    let elapsed = now.duration_since(self.last_update).as_secs_f64();
    self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
    self.last_update = now;
  }
}

impl RateLimiter {
  pub fn new(config: &LimitsSection) -> Self {
    Self {
      requests_per_second: config.requests_per_second,
      // A burst smaller than one request would reject everything
      burst_size: config.burst_size.max(1),
      buckets: Mutex::new(HashMap::new()),
    }
  }

  pub fn is_unlimited(&self) -> bool {
    self.requests_per_second == 0
  }

  /// Take one token for `ip`, or report when the next one is due
  pub fn check_request(&self, ip: IpAddr) -> Result<(), RateLimitError> {
    if self.is_unlimited() {
      return Ok(());
    }

    let mut buckets = self.buckets.lock();
    let bucket = buckets
      .entry(ip)
      .or_insert_with(|| TokenBucket::new(self.requests_per_second, self.burst_size));

    if bucket.try_consume() {
      Ok(())
    } else {
      Err(RateLimitError::RateLimited {
        ip,
        retry_after: Duration::from_secs_f64(1.0 / bucket.rate),
      })
    }
  }

  pub fn tracked_clients(&self) -> usize {
    self.buckets.lock().len()
  }

  /// Drop buckets that have refilled completely (call periodically)
  pub fn cleanup(&self) {
    let mut buckets = self.buckets.lock();
    buckets.retain(|_, bucket| {
      let idle = bucket.last_update.elapsed();
      bucket.refill();
      idle < STALE_AFTER || bucket.tokens < bucket.capacity
    });
  }
}

#[derive(Debug, Clone, Error)]
pub enum RateLimitError {
  #[error("rate limited, retry after {retry_after:?}")]
  RateLimited { ip: IpAddr, retry_after: Duration },
}
