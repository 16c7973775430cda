use std::sync::Arc;

use super::banner::BannerService;
use super::error::ServiceError;
use crate::batch::ClickBuffer;
use crate::types::{Click, ClickMetadata};

pub struct ClickService {
  banners: Arc<BannerService>,
  buffer: ClickBuffer,
}

impl ClickService {
  pub fn new(banners: Arc<BannerService>, buffer: ClickBuffer) -> Self {
    Self { banners, buffer }
  }

  /// Record a click against an active banner
  pub async fn register(
    &self,
    banner_id: i64,
    metadata: ClickMetadata,
  ) -> Result<Click, ServiceError> {
    if !self.banners.exists(banner_id).await? {
      return Err(ServiceError::BannerNotFound(banner_id));
    }
    Ok(self.buffer.submit(banner_id, metadata).await?)
  }

  pub async fn flush_pending(&self) -> Result<usize, ServiceError> {
    Ok(self.buffer.flush_pending().await?)
  }

  pub fn buffer(&self) -> &ClickBuffer {
    &self.buffer
  }
}
