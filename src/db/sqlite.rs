use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;

use super::backend::{BannerSource, ClickSink, DatabaseBackend, StatsSource};
use crate::types::{Banner, Click, MinuteStat};

const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;
PRAGMA temp_store = MEMORY;
PRAGMA busy_timeout = 5000;
"#;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS banners (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS clicks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    banner_id INTEGER NOT NULL REFERENCES banners(id),
    timestamp_ms INTEGER NOT NULL,
    user_ip TEXT,
    user_agent TEXT
);
CREATE INDEX IF NOT EXISTS idx_clicks_banner_ts ON clicks(banner_id, timestamp_ms);
"#;

const MINUTE_MS: i64 = 60_000;

pub struct SqliteBackend {
  conn: Connection,
}

impl SqliteBackend {
  pub async fn new(path: &str) -> Result<Self, anyhow::Error> {
    let conn = if path == ":memory:" {
      Connection::open_in_memory().await?
    } else {
      Connection::open(path).await?
    };

    conn
      .call(|conn| conn.execute_batch(PRAGMAS).map_err(|e| e.into()))
      .await?;

    Ok(Self { conn })
  }

  pub async fn in_memory() -> Result<Self, anyhow::Error> {
    Self::new(":memory:").await
  }

  /// Total stored clicks for a banner (diagnostics and tests)
  pub async fn count_clicks(&self, banner_id: i64) -> Result<i64, anyhow::Error> {
    let count = self
      .conn
      .call(move |conn| {
        conn
          .query_row(
            "SELECT COUNT(*) FROM clicks WHERE banner_id = ?1",
            params![banner_id],
            |row| row.get(0),
          )
          .map_err(|e| e.into())
      })
      .await?;
    Ok(count)
  }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn row_to_banner(row: &rusqlite::Row<'_>) -> Result<Banner, rusqlite::Error> {
  let created_at: String = row.get(2)?;
  let updated_at: String = row.get(3)?;
  Ok(Banner {
    id: row.get(0)?,
    name: row.get(1)?,
    created_at: parse_time(&created_at)?,
    updated_at: parse_time(&updated_at)?,
    is_active: row.get(4)?,
  })
}

#[async_trait]
impl ClickSink for SqliteBackend {
  async fn write_batch(&self, clicks: Vec<Click>) -> Result<(), anyhow::Error> {
    if clicks.is_empty() {
      return Ok(());
    }
    let count = clicks.len();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare_cached(
            "INSERT INTO clicks (banner_id, timestamp_ms, user_ip, user_agent)
             VALUES (?1, ?2, ?3, ?4)",
          )?;
          for click in &clicks {
            stmt.execute(params![
              click.banner_id(),
              click.timestamp().timestamp_millis(),
              click.user_ip(),
              click.user_agent(),
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::debug!("SQLite stored {} clicks", count);
    Ok(())
  }
}

#[async_trait]
impl BannerSource for SqliteBackend {
  async fn get_banner(&self, id: i64) -> Result<Option<Banner>, anyhow::Error> {
    let banner = self
      .conn
      .call(move |conn| {
        conn
          .query_row(
            "SELECT id, name, created_at, updated_at, is_active FROM banners WHERE id = ?1",
            params![id],
            row_to_banner,
          )
          .optional()
          .map_err(|e| e.into())
      })
      .await?;
    Ok(banner)
  }
}

#[async_trait]
impl StatsSource for SqliteBackend {
  async fn aggregate_range(
    &self,
    banner_id: i64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
  ) -> Result<Vec<MinuteStat>, anyhow::Error> {
    let from_ms = from.timestamp_millis();
    let to_ms = to.timestamp_millis();

    let rows: Vec<(i64, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT (timestamp_ms / ?4) * ?4 AS minute, COUNT(*)
           FROM clicks
           WHERE banner_id = ?1 AND timestamp_ms >= ?2 AND timestamp_ms <= ?3
           GROUP BY minute
           ORDER BY minute",
        )?;
        let rows = stmt
          .query_map(params![banner_id, from_ms, to_ms, MINUTE_MS], |row| {
            Ok((row.get(0)?, row.get(1)?))
          })?
          .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await?;

    let mut stats = Vec::with_capacity(rows.len());
    for (minute_ms, count) in rows {
      let ts = Utc
        .timestamp_millis_opt(minute_ms)
        .single()
        .ok_or_else(|| anyhow::anyhow!("invalid minute bucket: {}", minute_ms))?;
      stats.push(MinuteStat::new(ts, count));
    }
    Ok(stats)
  }
}

#[async_trait]
impl DatabaseBackend for SqliteBackend {
  fn name(&self) -> &'static str {
    "sqlite"
  }

  async fn init_schema(&self) -> Result<(), anyhow::Error> {
    self
      .conn
      .call(|conn| conn.execute_batch(SCHEMA).map_err(|e| e.into()))
      .await?;
    tracing::info!("SQLite schema initialized");
    Ok(())
  }

  async fn ping(&self) -> Result<(), anyhow::Error> {
    self
      .conn
      .call(|conn| {
        conn
          .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
          .map_err(|e| e.into())
      })
      .await?;
    Ok(())
  }

  async fn create_banner(&self, name: &str, is_active: bool) -> Result<Banner, anyhow::Error> {
    let name = name.to_string();
    let now = Utc::now();
    let stamp = now.to_rfc3339();

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO banners (name, created_at, updated_at, is_active) VALUES (?1, ?2, ?2, ?3)",
          params![name, stamp, is_active],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    self
      .get_banner(id)
      .await?
      .ok_or_else(|| anyhow::anyhow!("banner {} vanished after insert", id))
  }

  async fn seed_banners(&self, count: u64) -> Result<u64, anyhow::Error> {
    let count = i64::try_from(count)?;
    let stamp = Utc::now().to_rfc3339();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut inserted = 0u64;
        {
          let mut stmt = tx.prepare_cached(
            "INSERT OR IGNORE INTO banners (id, name, created_at, updated_at, is_active)
             VALUES (?1, ?2, ?3, ?3, 1)",
          )?;
          for id in 1..=count {
            inserted += stmt.execute(params![id, format!("Banner {}", id), stamp])? as u64;
          }
        }
        tx.commit()?;
        Ok(inserted)
      })
      .await?;

    if inserted > 0 {
      tracing::info!("Seeded {} banners", inserted);
    }
    Ok(inserted)
  }
}
