use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::http::{router, AppState};
use super::ServerConfig;
use crate::db::Repositories;
use crate::metrics::Metrics;

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

pub struct Daemon {
  config: ServerConfig,
  repos: Repositories,
  metrics: Arc<Metrics>,
  shutdown_tx: watch::Sender<bool>,
}

impl Daemon {
  pub fn new(config: ServerConfig, repos: Repositories) -> Self {
    let (shutdown_tx, _) = watch::channel(false);
    Self {
      config,
      repos,
      metrics: Arc::new(Metrics::new()),
      shutdown_tx,
    }
  }

  pub fn metrics(&self) -> Arc<Metrics> {
    self.metrics.clone()
  }

  /// Trigger graceful shutdown. Also honoured when called before `run`.
  pub fn shutdown(&self) {
    tracing::info!("Initiating graceful shutdown...");
    self.shutdown_tx.send_replace(true);
  }

  /// Serve until `shutdown` is called, then drain the click buffer
  pub async fn run(&self) -> Result<(), anyhow::Error> {
    let mut shutdown_rx = self.shutdown_tx.subscribe();
    let backend = self.repos.backend.clone();
    tracing::info!("Initializing {} schema...", backend.name());
    backend.init_schema().await?;

    if self.config.seed_banners > 0 {
      backend.seed_banners(self.config.seed_banners).await?;
    }

    let state = AppState::build(&self.config, self.repos.clone(), self.metrics.clone());
    tracing::info!(
      "Click flusher: batch size {}, interval {:?}; rate limit {} req/s (burst {})",
      state.clicks.buffer().config().batch_size,
      state.clicks.buffer().config().flush_interval,
      self.config.limits.requests_per_second,
      self.config.limits.burst_size
    );

    let cleanup_limiter = state.rate_limiter.clone();
    let mut cleanup_shutdown = self.shutdown_tx.subscribe();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
      loop {
        tokio::select! {
          _ = ticker.tick() => cleanup_limiter.cleanup(),
          _ = cleanup_shutdown.wait_for(|stop| *stop) => break,
        }
      }
    });

    let app = router(state.clone(), &self.config);
    let addr = self.config.address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Click counter listening on http://{}", addr);

    let served = axum::serve(
      listener,
      app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
      let _ = shutdown_rx.wait_for(|stop| *stop).await;
      tracing::info!("HTTP server shutting down");
    })
    .await;

    drain(&state).await;
    served?;
    Ok(())
  }
}

/// Final flush and cache teardown. Failures are logged, never fatal.
async fn drain(state: &AppState) {
  match state.clicks.buffer().close().await {
    Ok(0) => {}
    Ok(n) => tracing::info!("Flushed {} pending clicks", n),
    Err(e) => tracing::error!("Final click flush failed: {}", e),
  }
  state.store.close().await;
  tracing::info!("Shutdown complete");
}
