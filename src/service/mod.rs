//! Read-through services over the caches and the backend

mod banner;
mod click;
mod error;
mod stats;

pub use banner::BannerService;
pub use click::ClickService;
pub use error::ServiceError;
pub use stats::StatsService;
