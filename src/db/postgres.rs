use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::{NoTls, Row};

use super::backend::{BannerSource, ClickSink, DatabaseBackend, StatsSource};
use crate::types::{Banner, Click, MinuteStat};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS banners (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    is_active BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS clicks (
    id BIGSERIAL PRIMARY KEY,
    banner_id BIGINT NOT NULL REFERENCES banners(id),
    timestamp TIMESTAMPTZ NOT NULL,
    user_ip VARCHAR(64),
    user_agent TEXT
);
CREATE INDEX IF NOT EXISTS idx_clicks_banner_ts ON clicks(banner_id, timestamp);
"#;

pub struct PostgresBackend {
  pool: Pool,
}

impl PostgresBackend {
  pub fn new(url: &str, max_connections: usize) -> Result<Self, anyhow::Error> {
    let mut cfg = Config::new();
    cfg.url = Some(url.into());
    cfg.manager = Some(ManagerConfig {
      recycling_method: RecyclingMethod::Fast,
    });
    if max_connections > 0 {
      cfg.pool = Some(PoolConfig::new(max_connections));
    }
    let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
    Ok(Self { pool })
  }
}

fn row_to_banner(row: &Row) -> Banner {
  Banner {
    id: row.get("id"),
    name: row.get("name"),
    created_at: row.get("created_at"),
    updated_at: row.get("updated_at"),
    is_active: row.get("is_active"),
  }
}

#[async_trait]
impl ClickSink for PostgresBackend {
  async fn write_batch(&self, clicks: Vec<Click>) -> Result<(), anyhow::Error> {
    if clicks.is_empty() {
      return Ok(());
    }

    let mut client = self.pool.get().await?;
    let tx = client.transaction().await?;
    let stmt = tx
      .prepare(
        "INSERT INTO clicks (banner_id, timestamp, user_ip, user_agent) VALUES ($1, $2, $3, $4)",
      )
      .await?;

    for click in &clicks {
      let banner_id = click.banner_id();
      let timestamp = click.timestamp();
      let user_ip = click.user_ip();
      let user_agent = click.user_agent();
      tx.execute(&stmt, &[&banner_id, &timestamp, &user_ip, &user_agent])
        .await?;
    }

    tx.commit().await?;
    tracing::debug!("PostgreSQL stored {} clicks", clicks.len());
    Ok(())
  }
}

#[async_trait]
impl BannerSource for PostgresBackend {
  async fn get_banner(&self, id: i64) -> Result<Option<Banner>, anyhow::Error> {
    let row = self
      .pool
      .get()
      .await?
      .query_opt(
        "SELECT id, name, created_at, updated_at, is_active FROM banners WHERE id = $1",
        &[&id],
      )
      .await?;
    Ok(row.as_ref().map(row_to_banner))
  }
}

#[async_trait]
impl StatsSource for PostgresBackend {
  async fn aggregate_range(
    &self,
    banner_id: i64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
  ) -> Result<Vec<MinuteStat>, anyhow::Error> {
    let rows = self
      .pool
      .get()
      .await?
      .query(
        "SELECT date_trunc('minute', timestamp) AS minute, COUNT(*) AS clicks
         FROM clicks
         WHERE banner_id = $1 AND timestamp >= $2 AND timestamp <= $3
         GROUP BY minute
         ORDER BY minute",
        &[&banner_id, &from, &to],
      )
      .await?;

    Ok(
      rows
        .iter()
        .map(|row| {
          let minute: DateTime<Utc> = row.get("minute");
          let clicks: i64 = row.get("clicks");
          MinuteStat::new(minute, clicks)
        })
        .collect(),
    )
  }
}

#[async_trait]
impl DatabaseBackend for PostgresBackend {
  fn name(&self) -> &'static str {
    "postgres"
  }

  async fn init_schema(&self) -> Result<(), anyhow::Error> {
    self.pool.get().await?.batch_execute(SCHEMA).await?;
    tracing::info!("PostgreSQL schema initialized");
    Ok(())
  }

  async fn ping(&self) -> Result<(), anyhow::Error> {
    self.pool.get().await?.simple_query("SELECT 1").await?;
    Ok(())
  }

  async fn create_banner(&self, name: &str, is_active: bool) -> Result<Banner, anyhow::Error> {
    let row = self
      .pool
      .get()
      .await?
      .query_one(
        "INSERT INTO banners (name, is_active) VALUES ($1, $2)
         RETURNING id, name, created_at, updated_at, is_active",
        &[&name, &is_active],
      )
      .await?;
    Ok(row_to_banner(&row))
  }

  async fn seed_banners(&self, count: u64) -> Result<u64, anyhow::Error> {
    let count = i64::try_from(count)?;
    let client = self.pool.get().await?;
    let inserted = client
      .execute(
        "INSERT INTO banners (id, name)
         SELECT g, 'Banner ' || g FROM generate_series(1::bigint, $1::bigint) AS g
         ON CONFLICT (id) DO NOTHING",
        &[&count],
      )
      .await?;

    // Keep BIGSERIAL ahead of explicitly inserted ids
    client
      .batch_execute(
        "SELECT setval(pg_get_serial_sequence('banners', 'id'), GREATEST((SELECT MAX(id) FROM banners), 1))",
      )
      .await?;

    if inserted > 0 {
      tracing::info!("Seeded {} banners", inserted);
    }
    Ok(inserted)
  }
}
