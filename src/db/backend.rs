use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::types::{Banner, Click, MinuteStat};

/// Bulk destination for buffered clicks.
///
/// A batch is written atomically: either every click lands or none do.
#[async_trait]
pub trait ClickSink: Send + Sync {
  async fn write_batch(&self, clicks: Vec<Click>) -> Result<(), anyhow::Error>;
}

/// Source of truth for banner records
#[async_trait]
pub trait BannerSource: Send + Sync {
  async fn get_banner(&self, id: i64) -> Result<Option<Banner>, anyhow::Error>;
}

/// Source of truth for per-minute click counts
#[async_trait]
pub trait StatsSource: Send + Sync {
  /// Minute buckets for `[from, to]` inclusive, ascending by time.
  /// Minutes without clicks are absent.
  async fn aggregate_range(
    &self,
    banner_id: i64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
  ) -> Result<Vec<MinuteStat>, anyhow::Error>;
}

/// Storage backend for click counting
#[async_trait]
pub trait DatabaseBackend: ClickSink + BannerSource + StatsSource {
  fn name(&self) -> &'static str;

  async fn init_schema(&self) -> Result<(), anyhow::Error>;

  /// Cheap liveness probe used by the health endpoint
  async fn ping(&self) -> Result<(), anyhow::Error>;

  async fn create_banner(&self, name: &str, is_active: bool) -> Result<Banner, anyhow::Error>;

  /// Ensure banners `1..=count` exist, leaving existing rows untouched.
  /// Returns how many were inserted.
  async fn seed_banners(&self, count: u64) -> Result<u64, anyhow::Error>;
}

/// One backend handed out as the narrow interfaces each component consumes
#[derive(Clone)]
pub struct Repositories {
  pub sink: Arc<dyn ClickSink>,
  pub banners: Arc<dyn BannerSource>,
  pub stats: Arc<dyn StatsSource>,
  pub backend: Arc<dyn DatabaseBackend>,
}

impl Repositories {
  pub fn from_backend<B: DatabaseBackend + 'static>(backend: Arc<B>) -> Self {
    Self {
      sink: backend.clone(),
      banners: backend.clone(),
      stats: backend.clone(),
      backend,
    }
  }
}
