use std::sync::Arc;

use super::error::ServiceError;
use crate::cache::{BannerCache, CacheError};
use crate::db::BannerSource;
use crate::metrics::Metrics;

pub struct BannerService {
  cache: BannerCache,
  source: Arc<dyn BannerSource>,
  metrics: Arc<Metrics>,
}

impl BannerService {
  pub fn new(cache: BannerCache, source: Arc<dyn BannerSource>, metrics: Arc<Metrics>) -> Self {
    Self {
      cache,
      source,
      metrics,
    }
  }

  /// Whether the banner exists and is active.
  ///
  /// Unknown banners are not cached, so a banner created later is seen on
  /// the next lookup.
  pub async fn exists(&self, banner_id: i64) -> Result<bool, ServiceError> {
    if banner_id <= 0 {
      return Err(ServiceError::InvalidIdentifier(banner_id));
    }

    match self.cache.get(banner_id) {
      Ok(banner) => {
        self.metrics.record_banner_cache(true);
        return Ok(banner.is_active);
      }
      Err(CacheError::NotFound) => {}
      Err(e) => tracing::warn!("Discarding unreadable cache entry for banner {}: {}", banner_id, e),
    }
    self.metrics.record_banner_cache(false);

    let Some(banner) = self.source.get_banner(banner_id).await? else {
      return Ok(false);
    };

    if let Err(e) = self.cache.set(&banner) {
      tracing::warn!("Failed to cache banner {}: {}", banner_id, e);
    }
    Ok(banner.is_active)
  }
}
