use parking_lot::Mutex;
use std::sync::Arc;

use super::config::BufferConfig;
use super::error::ClickError;
use super::timer::{DebounceTimer, TimerCommand};
use crate::db::ClickSink;
use crate::metrics::Metrics;
use crate::types::{Click, ClickMetadata};

/// Write-behind buffer for clicks.
///
/// Cloning is cheap and every clone feeds the same queue. Must be created
/// inside a tokio runtime because it spawns its flush timer.
#[derive(Clone)]
pub struct ClickBuffer {
  inner: Arc<Inner>,
}

pub(super) struct Inner {
  queue: Mutex<Vec<Click>>,
  sink: Arc<dyn ClickSink>,
  config: BufferConfig,
  metrics: Arc<Metrics>,
  timer: DebounceTimer,
}

impl ClickBuffer {
  pub fn new(sink: Arc<dyn ClickSink>, config: BufferConfig, metrics: Arc<Metrics>) -> Self {
    let config = config.normalized();
    let inner = Arc::new_cyclic(|weak| Inner {
      queue: Mutex::new(Vec::with_capacity(config.batch_size)),
      sink,
      config,
      metrics,
      timer: DebounceTimer::spawn(weak.clone(), config.flush_interval),
    });

    tracing::debug!(
      batch_size = config.batch_size,
      flush_interval = ?config.flush_interval,
      "Click buffer started"
    );
    Self { inner }
  }

  pub fn config(&self) -> BufferConfig {
    self.inner.config
  }

  /// Accept a click for later persistence.
  ///
  /// Returns as soon as the click is queued, unless this click fills the
  /// batch: then the batch is written before returning and a sink failure
  /// is reported to this caller.
  pub async fn submit(&self, banner_id: i64, metadata: ClickMetadata) -> Result<Click, ClickError> {
    let click = Click::new(banner_id, metadata)?;

    let full = {
      let mut queue = self.inner.queue.lock();
      queue.push(click.clone());
      if queue.len() >= self.inner.config.batch_size {
        true
      } else {
        self.inner.timer.send(TimerCommand::Reset);
        false
      }
    };
    self.inner.metrics.record_click_accepted();

    if full {
      self.flush_detached().await?;
    }
    Ok(click)
  }

  /// Write everything queued right now. Returns the number of clicks written.
  pub async fn flush_pending(&self) -> Result<usize, ClickError> {
    self.flush_detached().await
  }

  /// Run the sink write on its own task and wait for it.
  ///
  /// Once a batch leaves the queue its write completes and is counted even
  /// if the caller's future is dropped.
  async fn flush_detached(&self) -> Result<usize, ClickError> {
    let Some(batch) = self.inner.take_batch() else {
      return Ok(0);
    };
    let count = batch.len();
    let inner = self.inner.clone();

    match tokio::spawn(async move { inner.write(batch).await }).await {
      Ok(result) => result,
      Err(e) => {
        self.inner.metrics.record_flush_failure(count);
        tracing::error!("Flush task for {} clicks did not complete: {}", count, e);
        Err(ClickError::SinkFailure {
          dropped: count,
          source: anyhow::anyhow!("flush task failed: {}", e),
        })
      }
    }
  }

  pub fn pending_len(&self) -> usize {
    self.inner.queue.lock().len()
  }

  /// Stop the timer, then write whatever is still queued
  pub async fn close(&self) -> Result<usize, ClickError> {
    self.inner.timer.stop().await;
    self.flush_detached().await
  }
}

impl Inner {
  /// Swap the queue out under the lock and hand the snapshot to the sink.
  ///
  /// A failed write drops the snapshot.
  pub(super) async fn flush(&self) -> Result<usize, ClickError> {
    match self.take_batch() {
      Some(batch) => self.write(batch).await,
      None => Ok(0),
    }
  }

  fn take_batch(&self) -> Option<Vec<Click>> {
    let mut queue = self.queue.lock();
    if queue.is_empty() {
      return None;
    }
    self.timer.send(TimerCommand::Cancel);
    Some(std::mem::replace(
      &mut *queue,
      Vec::with_capacity(self.config.batch_size),
    ))
  }

  async fn write(&self, batch: Vec<Click>) -> Result<usize, ClickError> {
    let count = batch.len();
    let write = self.sink.write_batch(batch);
    let result = match self.config.flush_timeout {
      Some(limit) => match tokio::time::timeout(limit, write).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("sink did not finish within {:?}", limit)),
      },
      None => write.await,
    };

    match result {
      Ok(()) => {
        self.metrics.record_flush(count);
        tracing::debug!("Flushed {} clicks", count);
        Ok(count)
      }
      Err(source) => {
        self.metrics.record_flush_failure(count);
        Err(ClickError::SinkFailure {
          dropped: count,
          source,
        })
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use std::time::Duration;

  struct NullSink;

  #[async_trait]
  impl ClickSink for NullSink {
    async fn write_batch(&self, _clicks: Vec<Click>) -> Result<(), anyhow::Error> {
      Ok(())
    }
  }

  #[tokio::test]
  async fn test_invalid_id_is_not_queued() {
    let metrics = Arc::new(Metrics::new());
    let buffer = ClickBuffer::new(Arc::new(NullSink), BufferConfig::default(), metrics.clone());

    let err = buffer.submit(0, ClickMetadata::default()).await.unwrap_err();
    assert!(matches!(err, ClickError::InvalidIdentifier(0)));
    assert_eq!(buffer.pending_len(), 0);
    assert_eq!(metrics.snapshot().clicks_accepted, 0);
  }

  #[tokio::test]
  async fn test_defaults_applied() {
    let buffer = ClickBuffer::new(
      Arc::new(NullSink),
      BufferConfig::new(0, Duration::ZERO),
      Arc::new(Metrics::new()),
    );
    assert_eq!(buffer.config().batch_size, 100);
    assert_eq!(buffer.config().flush_interval, Duration::from_secs(2));
  }
}
