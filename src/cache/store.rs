//! Cache store implementation

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::entry::{CacheEntry, CacheValue};
use super::error::CacheError;

/// TTL applied to a counter created by `increment_by`
pub const DEFAULT_COUNTER_TTL: Duration = Duration::from_secs(3600);

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
  pub keys: usize,
  pub hits: u64,
  pub misses: u64,
  pub expired: u64,
}

impl CacheStats {
  pub fn hit_rate(&self) -> f64 {
    let total = self.hits + self.misses;
    if total == 0 {
      0.0
    } else {
      self.hits as f64 / total as f64
    }
  }
}

struct Sweeper {
  shutdown_tx: oneshot::Sender<()>,
  handle: JoinHandle<()>,
}

/// In-memory TTL store shared by the typed cache facades
pub struct InMemoryCacheStore {
  data: RwLock<HashMap<String, CacheEntry>>,
  hits: AtomicU64,
  misses: AtomicU64,
  expired: AtomicU64,
  sweeper: Mutex<Option<Sweeper>>,
}

impl Default for InMemoryCacheStore {
  fn default() -> Self {
    Self::new()
  }
}

impl InMemoryCacheStore {
  pub fn new() -> Self {
    Self {
      data: RwLock::new(HashMap::new()),
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
      expired: AtomicU64::new(0),
      sweeper: Mutex::new(None),
    }
  }

  /// Create a store with a running sweeper
  pub fn with_sweeper(cleanup_interval: Duration) -> Arc<Self> {
    let store = Arc::new(Self::new());
    store.start_sweeper(cleanup_interval);
    store
  }

  pub fn get(&self, key: &str) -> Result<CacheValue, CacheError> {
    {
      let data = self.data.read();
      match data.get(key) {
        None => {
          self.misses.fetch_add(1, Ordering::Relaxed);
          return Err(CacheError::NotFound);
        }
        Some(entry) if !entry.is_expired() => {
          self.hits.fetch_add(1, Ordering::Relaxed);
          return Ok(entry.value.clone());
        }
        Some(_) => {}
      }
    }

    // Expired: upgrade and re-check, a concurrent set may have refreshed it
    let mut data = self.data.write();
    match data.get(key) {
      Some(entry) if !entry.is_expired() => {
        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(entry.value.clone())
      }
      Some(_) => {
        data.remove(key);
        self.expired.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
        Err(CacheError::NotFound)
      }
      None => {
        self.misses.fetch_add(1, Ordering::Relaxed);
        Err(CacheError::NotFound)
      }
    }
  }

  pub fn set(&self, key: &str, value: CacheValue, ttl: Duration) {
    let entry = CacheEntry::new(value, ttl);
    self.data.write().insert(key.to_string(), entry);
  }

  pub fn delete(&self, key: &str) -> bool {
    self.data.write().remove(key).is_some()
  }

  pub fn clear(&self) {
    self.data.write().clear();
  }

  /// Add `delta` to an integer entry, creating it when absent or expired.
  ///
  /// The read-modify-write happens under one exclusive lock. An existing
  /// entry keeps its expiry; a new one gets [`DEFAULT_COUNTER_TTL`].
  /// A sum outside `i64` is [`CacheError::Overflow`] and leaves the value as it was.
  pub fn increment_by(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
    let mut data = self.data.write();

    if let Some(entry) = data.get_mut(key) {
      if !entry.is_expired() {
        return match &mut entry.value {
          CacheValue::Integer(i) => {
            *i = i.checked_add(delta).ok_or(CacheError::Overflow)?;
            Ok(*i)
          }
          other => Err(CacheError::TypeMismatch {
            expected: "integer",
            found: other.kind(),
          }),
        };
      }
    }

    data.insert(
      key.to_string(),
      CacheEntry::new(CacheValue::Integer(delta), DEFAULT_COUNTER_TTL),
    );
    Ok(delta)
  }

  pub fn exists(&self, key: &str) -> bool {
    let data = self.data.read();
    data.get(key).map(|e| !e.is_expired()).unwrap_or(false)
  }

  /// Keys starting with `prefix`. Expired entries not yet swept may appear.
  pub fn keys(&self, prefix: &str) -> Vec<String> {
    let data = self.data.read();
    data
      .keys()
      .filter(|k| k.starts_with(prefix))
      .cloned()
      .collect()
  }

  /// Physically stored entries, including expired ones awaiting a sweep
  pub fn len(&self) -> usize {
    self.data.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.read().is_empty()
  }

  /// Remove every entry whose deadline has been reached
  pub fn evict_expired(&self) -> usize {
    let now = Instant::now();
    let mut data = self.data.write();
    let before = data.len();
    data.retain(|_, entry| entry.expires_at > now);
    let count = before - data.len();
    self.expired.fetch_add(count as u64, Ordering::Relaxed);
    count
  }

  pub fn info(&self) -> CacheStats {
    CacheStats {
      keys: self.len(),
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      expired: self.expired.load(Ordering::Relaxed),
    }
  }

  /// Spawn the periodic sweep. Replaces a sweeper that is already running.
  pub fn start_sweeper(self: &Arc<Self>, interval: Duration) {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(run_sweeper(Arc::downgrade(self), interval, shutdown_rx));

    if let Some(old) = self.sweeper.lock().replace(Sweeper {
      shutdown_tx,
      handle,
    }) {
      let _ = old.shutdown_tx.send(());
    }
    tracing::debug!("Cache sweeper started (interval {:?})", interval);
  }

  /// Stop the sweeper and wait for it to finish
  pub async fn close(&self) {
    let sweeper = self.sweeper.lock().take();
    if let Some(sweeper) = sweeper {
      let _ = sweeper.shutdown_tx.send(());
      if let Err(e) = sweeper.handle.await {
        tracing::warn!("Cache sweeper ended abnormally: {}", e);
      }
      tracing::debug!("Cache sweeper stopped");
    }
  }
}

impl Drop for InMemoryCacheStore {
  fn drop(&mut self) {
    if let Some(sweeper) = self.sweeper.get_mut().take() {
      let _ = sweeper.shutdown_tx.send(());
    }
  }
}

async fn run_sweeper(
  store: Weak<InMemoryCacheStore>,
  interval: Duration,
  mut shutdown_rx: oneshot::Receiver<()>,
) {
  let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  loop {
    tokio::select! {
      _ = ticker.tick() => {
        let Some(live) = store.upgrade() else { break };
        let evicted = live.evict_expired();
        if evicted > 0 {
          tracing::debug!("Evicted {} expired keys", evicted);
        }
      }
      _ = &mut shutdown_rx => break,
    }
  }
}
