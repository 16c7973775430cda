use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::banner::BannerService;
use super::error::ServiceError;
use crate::cache::{CacheError, StatsCache};
use crate::db::StatsSource;
use crate::metrics::Metrics;
use crate::types::{StatPeriod, StatsResponse};

pub struct StatsService {
  banners: Arc<BannerService>,
  cache: StatsCache,
  source: Arc<dyn StatsSource>,
  metrics: Arc<Metrics>,
}

impl StatsService {
  pub fn new(
    banners: Arc<BannerService>,
    cache: StatsCache,
    source: Arc<dyn StatsSource>,
    metrics: Arc<Metrics>,
  ) -> Self {
    Self {
      banners,
      cache,
      source,
      metrics,
    }
  }

  pub async fn get_stats(
    &self,
    banner_id: i64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
  ) -> Result<StatsResponse, ServiceError> {
    if banner_id <= 0 {
      return Err(ServiceError::InvalidIdentifier(banner_id));
    }
    let period = StatPeriod::new(from, to)?;
    if !self.banners.exists(banner_id).await? {
      return Err(ServiceError::BannerNotFound(banner_id));
    }

    match self.cache.get(banner_id, from, to) {
      Ok(response) => {
        self.metrics.record_stats_cache(true);
        tracing::debug!("Stats cache hit for banner {}", banner_id);
        return Ok(response);
      }
      Err(CacheError::NotFound) => {}
      Err(e) => tracing::warn!("Discarding unreadable stats entry for banner {}: {}", banner_id, e),
    }
    self.metrics.record_stats_cache(false);

    let stats = self.source.aggregate_range(banner_id, from, to).await?;
    let response = StatsResponse::new(banner_id, period, stats);

    if let Err(e) = self.cache.set(&response) {
      tracing::warn!("Failed to cache stats for banner {}: {}", banner_id, e);
    }
    Ok(response)
  }
}
