use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
  pub batch_size: usize,
  pub flush_interval: Duration,
  /// Upper bound on a single sink call
  pub flush_timeout: Option<Duration>,
}

impl Default for BufferConfig {
  fn default() -> Self {
    Self {
      batch_size: DEFAULT_BATCH_SIZE,
      flush_interval: DEFAULT_FLUSH_INTERVAL,
      flush_timeout: None,
    }
  }
}

impl BufferConfig {
  pub fn new(batch_size: usize, flush_interval: Duration) -> Self {
    Self {
      batch_size,
      flush_interval,
      flush_timeout: None,
    }
  }

  pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
    self.flush_timeout = Some(timeout);
    self
  }

  /// Zero values fall back to the defaults
  pub(super) fn normalized(self) -> Self {
    Self {
      batch_size: if self.batch_size == 0 {
        DEFAULT_BATCH_SIZE
      } else {
        self.batch_size
      },
      flush_interval: if self.flush_interval.is_zero() {
        DEFAULT_FLUSH_INTERVAL
      } else {
        self.flush_interval
      },
      flush_timeout: self.flush_timeout.filter(|t| !t.is_zero()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_zero_values_use_defaults() {
    let config = BufferConfig::new(0, Duration::ZERO)
      .with_flush_timeout(Duration::ZERO)
      .normalized();
    assert_eq!(config.batch_size, 100);
    assert_eq!(config.flush_interval, Duration::from_secs(2));
    assert_eq!(config.flush_timeout, None);
  }
}
