use async_trait::async_trait;
use clickcounter::batch::{BufferConfig, ClickBuffer, ClickError};
use clickcounter::db::ClickSink;
use clickcounter::metrics::Metrics;
use clickcounter::types::{Click, ClickMetadata};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Records every batch it receives, optionally failing or stalling
#[derive(Default)]
struct RecordingSink {
  batches: Mutex<Vec<Vec<Click>>>,
  fail: AtomicBool,
  stall: Option<Duration>,
}

impl RecordingSink {
  fn stalling(stall: Duration) -> Self {
    Self {
      stall: Some(stall),
      ..Default::default()
    }
  }

  fn batch_ids(&self) -> Vec<Vec<i64>> {
    self
      .batches
      .lock()
      .iter()
      .map(|b| b.iter().map(Click::banner_id).collect())
      .collect()
  }

  fn total(&self) -> usize {
    self.batches.lock().iter().map(Vec::len).sum()
  }
}

#[async_trait]
impl ClickSink for RecordingSink {
  async fn write_batch(&self, clicks: Vec<Click>) -> Result<(), anyhow::Error> {
    if let Some(stall) = self.stall {
      tokio::time::sleep(stall).await;
    }
    if self.fail.load(Ordering::SeqCst) {
      anyhow::bail!("sink unavailable");
    }
    self.batches.lock().push(clicks);
    Ok(())
  }
}

fn buffer_with(sink: Arc<RecordingSink>, batch_size: usize, interval: Duration) -> (ClickBuffer, Arc<Metrics>) {
  let metrics = Arc::new(Metrics::new());
  let buffer = ClickBuffer::new(sink, BufferConfig::new(batch_size, interval), metrics.clone());
  (buffer, metrics)
}

fn meta() -> ClickMetadata {
  ClickMetadata::new("127.0.0.1", "test-agent")
}

#[tokio::test]
async fn test_submit_below_batch_size_does_not_touch_sink() {
  let sink = Arc::new(RecordingSink::default());
  let (buffer, metrics) = buffer_with(sink.clone(), 10, Duration::from_secs(60));

  for id in 1..=4 {
    let click = buffer.submit(id, meta()).await.unwrap();
    assert_eq!(click.banner_id(), id);
    assert_eq!(click.user_agent(), Some("test-agent"));
  }

  assert_eq!(buffer.pending_len(), 4);
  assert!(sink.batch_ids().is_empty());
  assert_eq!(metrics.snapshot().clicks_accepted, 4);
}

#[tokio::test]
async fn test_flush_pending_writes_exactly_what_was_queued() {
  let sink = Arc::new(RecordingSink::default());
  let (buffer, _) = buffer_with(sink.clone(), 10, Duration::from_secs(60));

  for id in [3, 1, 2] {
    buffer.submit(id, meta()).await.unwrap();
  }

  assert_eq!(buffer.flush_pending().await.unwrap(), 3);
  assert_eq!(sink.batch_ids(), vec![vec![3, 1, 2]]);

  // Nothing left
  assert_eq!(buffer.flush_pending().await.unwrap(), 0);
  assert_eq!(sink.batch_ids().len(), 1);
}

#[tokio::test]
async fn test_reaching_batch_size_flushes_once() {
  let sink = Arc::new(RecordingSink::default());
  let (buffer, metrics) = buffer_with(sink.clone(), 5, Duration::from_secs(60));

  for id in 1..=5 {
    buffer.submit(id, meta()).await.unwrap();
  }

  assert_eq!(sink.batch_ids(), vec![vec![1, 2, 3, 4, 5]]);
  assert_eq!(buffer.pending_len(), 0);

  let snap = metrics.snapshot();
  assert_eq!(snap.flushes, 1);
  assert_eq!(snap.clicks_flushed, 5);
}

#[tokio::test]
async fn test_invalid_identifier_rejected() {
  let sink = Arc::new(RecordingSink::default());
  let (buffer, _) = buffer_with(sink.clone(), 5, Duration::from_secs(60));

  assert!(matches!(
    buffer.submit(-1, meta()).await,
    Err(ClickError::InvalidIdentifier(-1))
  ));
  assert_eq!(buffer.pending_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_size_and_timer_triggers() {
  let sink = Arc::new(RecordingSink::default());
  let (buffer, _) = buffer_with(sink.clone(), 3, Duration::from_secs(2));

  // t = 0: A, B
  buffer.submit(1, meta()).await.unwrap();
  buffer.submit(2, meta()).await.unwrap();
  assert!(sink.batch_ids().is_empty());

  // t = 2.1s: the idle timer has written A, B
  tokio::time::sleep(Duration::from_millis(2100)).await;
  assert_eq!(sink.batch_ids(), vec![vec![1, 2]]);

  // t = 3s: C, D, E fill a batch and are written by the third submit
  tokio::time::sleep(Duration::from_millis(900)).await;
  buffer.submit(3, meta()).await.unwrap();
  buffer.submit(4, meta()).await.unwrap();
  buffer.submit(5, meta()).await.unwrap();
  assert_eq!(sink.batch_ids(), vec![vec![1, 2], vec![3, 4, 5]]);

  // The size-triggered flush cancelled the timer: nothing else arrives
  tokio::time::sleep(Duration::from_secs(5)).await;
  assert_eq!(sink.batch_ids().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_each_submit_resets_the_timer() {
  let sink = Arc::new(RecordingSink::default());
  let (buffer, _) = buffer_with(sink.clone(), 100, Duration::from_secs(2));

  buffer.submit(1, meta()).await.unwrap();
  tokio::time::sleep(Duration::from_millis(1500)).await;
  buffer.submit(2, meta()).await.unwrap();

  // 2.1s after the first click, 0.6s after the second
  tokio::time::sleep(Duration::from_millis(600)).await;
  assert!(sink.batch_ids().is_empty());

  // 2.1s after the second click
  tokio::time::sleep(Duration::from_millis(1500)).await;
  assert_eq!(sink.batch_ids(), vec![vec![1, 2]]);
}

#[tokio::test]
async fn test_failed_explicit_flush_drops_batch() {
  let sink = Arc::new(RecordingSink::default());
  let (buffer, metrics) = buffer_with(sink.clone(), 10, Duration::from_secs(60));

  buffer.submit(1, meta()).await.unwrap();
  buffer.submit(2, meta()).await.unwrap();
  sink.fail.store(true, Ordering::SeqCst);

  match buffer.flush_pending().await {
    Err(ClickError::SinkFailure { dropped, .. }) => assert_eq!(dropped, 2),
    other => panic!("expected sink failure, got {:?}", other),
  }

  // Not re-queued
  assert_eq!(buffer.pending_len(), 0);
  sink.fail.store(false, Ordering::SeqCst);
  assert_eq!(buffer.flush_pending().await.unwrap(), 0);

  let snap = metrics.snapshot();
  assert_eq!(snap.flushes_failed, 1);
  assert_eq!(snap.clicks_dropped, 2);
}

#[tokio::test]
async fn test_size_triggered_failure_reported_to_submitter() {
  let sink = Arc::new(RecordingSink::default());
  sink.fail.store(true, Ordering::SeqCst);
  let (buffer, _) = buffer_with(sink.clone(), 2, Duration::from_secs(60));

  assert!(buffer.submit(1, meta()).await.is_ok());
  assert!(matches!(
    buffer.submit(2, meta()).await,
    Err(ClickError::SinkFailure { dropped: 2, .. })
  ));
  assert_eq!(buffer.pending_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_background_failure_is_dropped_and_counted() {
  let sink = Arc::new(RecordingSink::default());
  sink.fail.store(true, Ordering::SeqCst);
  let (buffer, metrics) = buffer_with(sink.clone(), 100, Duration::from_secs(2));

  buffer.submit(7, meta()).await.unwrap();
  tokio::time::sleep(Duration::from_secs(3)).await;

  assert_eq!(buffer.pending_len(), 0);
  assert!(sink.batch_ids().is_empty());
  let snap = metrics.snapshot();
  assert_eq!(snap.flushes_failed, 1);
  assert_eq!(snap.clicks_dropped, 1);
}

#[tokio::test(start_paused = true)]
async fn test_flush_timeout_bounds_sink_call() {
  let sink = Arc::new(RecordingSink::stalling(Duration::from_secs(10)));
  let metrics = Arc::new(Metrics::new());
  let config = BufferConfig::new(10, Duration::from_secs(60)).with_flush_timeout(Duration::from_secs(1));
  let buffer = ClickBuffer::new(sink.clone(), config, metrics.clone());

  buffer.submit(1, meta()).await.unwrap();
  let err = buffer.flush_pending().await.unwrap_err();
  assert!(matches!(err, ClickError::SinkFailure { dropped: 1, .. }));
  assert!(sink.batch_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dropped_submit_still_completes_its_flush() {
  let sink = Arc::new(RecordingSink::stalling(Duration::from_secs(10)));
  let (buffer, metrics) = buffer_with(sink.clone(), 2, Duration::from_secs(60));

  buffer.submit(1, meta()).await.unwrap();
  let filled = tokio::time::timeout(Duration::from_secs(1), buffer.submit(2, meta())).await;
  assert!(filled.is_err());

  tokio::time::sleep(Duration::from_secs(60)).await;
  assert_eq!(buffer.pending_len(), 0);
  assert_eq!(sink.batch_ids(), vec![vec![1, 2]]);

  let snap = metrics.snapshot();
  assert_eq!(snap.clicks_accepted, 2);
  assert_eq!(snap.clicks_flushed, 2);
  assert_eq!(snap.clicks_dropped, 0);
}

#[tokio::test(start_paused = true)]
async fn test_submits_proceed_while_explicit_flush_is_stalled() {
  let sink = Arc::new(RecordingSink::stalling(Duration::from_secs(10)));
  let (buffer, _) = buffer_with(sink.clone(), 10, Duration::from_secs(60));

  buffer.submit(1, meta()).await.unwrap();
  buffer.submit(2, meta()).await.unwrap();

  let flusher = buffer.clone();
  let flush = tokio::spawn(async move { flusher.flush_pending().await });
  tokio::time::sleep(Duration::from_secs(1)).await;
  assert_eq!(buffer.pending_len(), 0);

  // The sink is mid-write; new clicks queue without waiting on it
  let started = tokio::time::Instant::now();
  buffer.submit(3, meta()).await.unwrap();
  buffer.submit(4, meta()).await.unwrap();
  assert_eq!(started.elapsed(), Duration::ZERO);
  assert_eq!(buffer.pending_len(), 2);
  assert!(sink.batch_ids().is_empty());

  assert_eq!(flush.await.unwrap().unwrap(), 2);
  assert_eq!(buffer.flush_pending().await.unwrap(), 2);
  assert_eq!(sink.batch_ids(), vec![vec![1, 2], vec![3, 4]]);
}

#[tokio::test(start_paused = true)]
async fn test_submits_proceed_while_timer_flush_is_stalled() {
  let sink = Arc::new(RecordingSink::stalling(Duration::from_secs(10)));
  let (buffer, _) = buffer_with(sink.clone(), 10, Duration::from_secs(2));

  buffer.submit(1, meta()).await.unwrap();
  // The timer fired at 2s and its write runs until 12s
  tokio::time::sleep(Duration::from_secs(3)).await;
  assert_eq!(buffer.pending_len(), 0);
  assert!(sink.batch_ids().is_empty());

  let started = tokio::time::Instant::now();
  buffer.submit(2, meta()).await.unwrap();
  assert_eq!(started.elapsed(), Duration::ZERO);
  assert_eq!(buffer.pending_len(), 1);

  tokio::time::sleep(Duration::from_secs(10)).await;
  assert_eq!(sink.batch_ids(), vec![vec![1]]);
  assert_eq!(buffer.close().await.unwrap(), 1);
  assert_eq!(sink.batch_ids(), vec![vec![1], vec![2]]);
}

#[tokio::test(start_paused = true)]
async fn test_zero_config_uses_default_interval() {
  let sink = Arc::new(RecordingSink::default());
  let (buffer, _) = buffer_with(sink.clone(), 0, Duration::ZERO);

  buffer.submit(1, meta()).await.unwrap();
  tokio::time::sleep(Duration::from_millis(1900)).await;
  assert!(sink.batch_ids().is_empty());
  tokio::time::sleep(Duration::from_millis(200)).await;
  assert_eq!(sink.batch_ids(), vec![vec![1]]);
}

#[tokio::test]
async fn test_close_flushes_remaining_clicks() {
  let sink = Arc::new(RecordingSink::default());
  let (buffer, _) = buffer_with(sink.clone(), 10, Duration::from_secs(60));

  buffer.submit(1, meta()).await.unwrap();
  buffer.submit(2, meta()).await.unwrap();
  assert_eq!(buffer.close().await.unwrap(), 2);
  assert_eq!(sink.total(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submits_land_in_exactly_one_flush() {
  let sink = Arc::new(RecordingSink::default());
  let (buffer, _) = buffer_with(sink.clone(), 7, Duration::from_millis(5));

  let mut handles = Vec::new();
  for task in 0..20i64 {
    let buffer = buffer.clone();
    handles.push(tokio::spawn(async move {
      for i in 0..50i64 {
        buffer.submit(task * 1000 + i + 1, meta()).await.unwrap();
      }
    }));
  }
  for handle in handles {
    handle.await.unwrap();
  }
  buffer.close().await.unwrap();

  let mut ids: Vec<i64> = sink.batch_ids().into_iter().flatten().collect();
  assert_eq!(ids.len(), 1000);
  ids.sort_unstable();
  ids.dedup();
  assert_eq!(ids.len(), 1000);
  assert!(sink.batches.lock().iter().all(|b| !b.is_empty()));
}
