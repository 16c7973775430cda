//! Process counters.
//!
//! A [`Metrics`] instance is created once by the daemon and shared by `Arc`
//! with each component that records into it.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
  requests_total: AtomicU64,
  requests_failed: AtomicU64,
  rate_limited: AtomicU64,
  clicks_accepted: AtomicU64,
  clicks_flushed: AtomicU64,
  clicks_dropped: AtomicU64,
  flushes: AtomicU64,
  flushes_failed: AtomicU64,
  banner_cache_hits: AtomicU64,
  banner_cache_misses: AtomicU64,
  stats_cache_hits: AtomicU64,
  stats_cache_misses: AtomicU64,
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
  pub requests_total: u64,
  pub requests_failed: u64,
  pub rate_limited: u64,
  pub clicks_accepted: u64,
  pub clicks_flushed: u64,
  pub clicks_dropped: u64,
  pub flushes: u64,
  pub flushes_failed: u64,
  pub banner_cache_hits: u64,
  pub banner_cache_misses: u64,
  pub stats_cache_hits: u64,
  pub stats_cache_misses: u64,
}

impl Metrics {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record_request(&self, failed: bool) {
    self.requests_total.fetch_add(1, Ordering::Relaxed);
    if failed {
      self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }
  }

  pub fn record_rate_limited(&self) {
    self.rate_limited.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_click_accepted(&self) {
    self.clicks_accepted.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_flush(&self, clicks: usize) {
    self.flushes.fetch_add(1, Ordering::Relaxed);
    self.clicks_flushed.fetch_add(clicks as u64, Ordering::Relaxed);
  }

  /// A failed flush loses its whole batch
  pub fn record_flush_failure(&self, clicks: usize) {
    self.flushes_failed.fetch_add(1, Ordering::Relaxed);
    self.clicks_dropped.fetch_add(clicks as u64, Ordering::Relaxed);
  }

  pub fn record_banner_cache(&self, hit: bool) {
    let counter = if hit {
      &self.banner_cache_hits
    } else {
      &self.banner_cache_misses
    };
    counter.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_stats_cache(&self, hit: bool) {
    let counter = if hit {
      &self.stats_cache_hits
    } else {
      &self.stats_cache_misses
    };
    counter.fetch_add(1, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> MetricsSnapshot {
    MetricsSnapshot {
      requests_total: self.requests_total.load(Ordering::Relaxed),
      requests_failed: self.requests_failed.load(Ordering::Relaxed),
      rate_limited: self.rate_limited.load(Ordering::Relaxed),
      clicks_accepted: self.clicks_accepted.load(Ordering::Relaxed),
      clicks_flushed: self.clicks_flushed.load(Ordering::Relaxed),
      clicks_dropped: self.clicks_dropped.load(Ordering::Relaxed),
      flushes: self.flushes.load(Ordering::Relaxed),
      flushes_failed: self.flushes_failed.load(Ordering::Relaxed),
      banner_cache_hits: self.banner_cache_hits.load(Ordering::Relaxed),
      banner_cache_misses: self.banner_cache_misses.load(Ordering::Relaxed),
      stats_cache_hits: self.stats_cache_hits.load(Ordering::Relaxed),
      stats_cache_misses: self.stats_cache_misses.load(Ordering::Relaxed),
    }
  }
}
