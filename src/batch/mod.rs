//! Write-behind batching of clicks.
//!
//! [`ClickBuffer`] accepts clicks without touching storage and hands them to a
//! [`ClickSink`](crate::db::ClickSink) in bulk, either when `batch_size`
//! clicks are queued or when `flush_interval` passes with no new submission.

mod buffer;
mod config;
mod error;
mod timer;

pub use buffer::ClickBuffer;
pub use config::{BufferConfig, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL};
pub use error::ClickError;
