mod banner;
mod click;
mod stats;

pub use banner::Banner;
pub use click::{truncate_to_minute, Click, ClickMetadata, InvalidBannerId};
pub use stats::{MinuteStat, PeriodError, StatPeriod, StatsResponse, MAX_PERIOD_DAYS};
