use clap::Parser;
use clickcounter::db::{PostgresBackend, Repositories, SqliteBackend};
use clickcounter::server::{BackendType, Daemon, LogFormat, ServerConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "clickd", about = "Banner click counter server", version)]
struct Args {
  #[arg(long, env = "CLICKCOUNTER_PG_URL")]
  pg_url: Option<String>,
  #[arg(long, env = "CLICKCOUNTER_SQLITE_PATH")]
  sqlite: Option<String>,
  #[arg(short, long)]
  port: Option<u16>,
  #[arg(long)]
  host: Option<String>,
  #[arg(short, long, env = "CLICKCOUNTER_CONFIG_PATH")]
  config: Option<String>,
  #[arg(long)]
  log_level: Option<String>,
  #[arg(long)]
  log_format: Option<LogFormat>,
  /// Ensure banners 1..=N exist at startup
  #[arg(long)]
  seed_banners: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
  let args = Args::parse();

  // Load config: explicit path > auto-detect > defaults
  let mut config = if let Some(path) = &args.config {
    ServerConfig::from_file(path)?
  } else {
    ServerConfig::find_and_load()?.unwrap_or_default()
  };

  // CLI args override config file
  if let Some(url) = args.pg_url {
    config.postgres.url = url;
    config.backend = BackendType::Postgres;
  }
  if let Some(path) = args.sqlite {
    config.sqlite.path = path;
    config.backend = BackendType::Sqlite;
  }
  if let Some(port) = args.port {
    config.server.port = port;
  }
  if let Some(host) = args.host {
    config.server.host = host;
  }
  if let Some(level) = args.log_level {
    config.logging.level = level;
  }
  if let Some(format) = args.log_format {
    config.logging.format = format;
  }
  if let Some(count) = args.seed_banners {
    config.seed_banners = count;
  }

  init_tracing(&config);
  config.validate()?;

  let repos = match config.backend {
    BackendType::Postgres => Repositories::from_backend(Arc::new(PostgresBackend::new(
      &config.postgres.url,
      config.postgres.max_connections,
    )?)),
    BackendType::Sqlite => {
      Repositories::from_backend(Arc::new(SqliteBackend::new(&config.sqlite.path).await?))
    }
  };
  tracing::info!("Using {} backend", repos.backend.name());

  let daemon = Arc::new(Daemon::new(config, repos));
  let daemon_clone = daemon.clone();

  // Handle shutdown signals (SIGINT, SIGTERM)
  tokio::spawn(async move {
    shutdown_signal().await;
    daemon_clone.shutdown();
  });

  daemon.run().await
}

fn init_tracing(config: &ServerConfig) {
  let filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| config.logging.level.clone().into());
  let registry = tracing_subscriber::registry().with(filter);

  match config.logging.format {
    LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
  }
}

async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      tracing::error!("Failed to listen for Ctrl+C: {}", e);
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut sig) => {
        sig.recv().await;
      }
      Err(e) => {
        tracing::error!("Failed to install SIGTERM handler: {}", e);
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => tracing::info!("Received SIGINT"),
    _ = terminate => tracing::info!("Received SIGTERM"),
  }
}
