mod config;
mod daemon;
mod http;
mod rate_limiter;

pub use config::{
  BackendType, ClickFlusherSection, LimitsSection, LogFormat, LoggingSection, PostgresSection,
  ServerConfig, ServerSection, SqliteSection, CONFIG_PATH_ENV,
};
pub use daemon::Daemon;
pub use http::{router, ApiError, AppState, ClickResponse, ClientIp, StatsBody, StatsRequest};
pub use rate_limiter::{RateLimitError, RateLimiter};
