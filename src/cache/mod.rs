//! In-memory TTL caching for the read path
//!
//! One [`InMemoryCacheStore`] backs both typed facades:
//! - [`BannerCache`] for banner existence lookups
//! - [`StatsCache`] for aggregated per-minute responses
//!
//! Expired entries are hidden on read and removed by a periodic sweep.

mod banner;
pub mod config;
mod entry;
mod error;
mod stats;
mod store;

pub use banner::BannerCache;
pub use config::CacheConfig;
pub use entry::{CacheEntry, CacheValue};
pub use error::CacheError;
pub use stats::StatsCache;
pub use store::{CacheStats, InMemoryCacheStore, DEFAULT_COUNTER_TTL};
