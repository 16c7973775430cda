//! Banner click counting with write-behind persistence and a TTL read cache.

pub mod batch;
pub mod cache;
pub mod db;
pub mod metrics;
pub mod server;
pub mod service;
pub mod types;

pub use batch::{BufferConfig, ClickBuffer, ClickError};
pub use cache::{BannerCache, CacheError, CacheValue, InMemoryCacheStore, StatsCache};
pub use metrics::{Metrics, MetricsSnapshot};
