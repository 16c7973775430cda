use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::batch::BufferConfig;
use crate::cache::CacheConfig;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "CLICKCOUNTER_CONFIG_PATH";

const CONFIG_CANDIDATES: [&str; 3] = [
  "clickcounter.yaml",
  "clickcounter.yml",
  "configs/config.yaml",
];

/// Expand environment variables in a string.
/// Supports $VAR_NAME and ${VAR_NAME} syntax.
fn expand_env_vars(input: &str) -> String {
  let mut result = input.to_string();

  while let Some(start) = result.find("${") {
    if let Some(end) = result[start..].find('}') {
      let var_name = &result[start + 2..start + end];
      let value = std::env::var(var_name).unwrap_or_default();
      result = format!(
        "{}{}{}",
        &result[..start],
        value,
        &result[start + end + 1..]
      );
    } else {
      break;
    }
  }

  // Bare $VAR. Slicing only at '$' and ASCII name bounds keeps char boundaries intact.
  let mut expanded = String::with_capacity(result.len());
  let mut rest = result.as_str();
  while let Some(pos) = rest.find('$') {
    expanded.push_str(&rest[..pos]);
    let after = &rest[pos + 1..];
    let name_len = after
      .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
      .unwrap_or(after.len());
    if name_len > 0 {
      expanded.push_str(&std::env::var(&after[..name_len]).unwrap_or_default());
    } else {
      expanded.push('$');
    }
    rest = &after[name_len..];
  }
  expanded.push_str(rest);

  expanded
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
  #[default]
  Postgres,
  Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
  #[serde(default)]
  pub server: ServerSection,
  #[serde(default)]
  pub backend: BackendType,
  #[serde(default)]
  pub postgres: PostgresSection,
  #[serde(default)]
  pub sqlite: SqliteSection,
  #[serde(default)]
  pub logging: LoggingSection,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub click_flusher: ClickFlusherSection,
  #[serde(default)]
  pub limits: LimitsSection,
  /// Ensure banners 1..=N exist at startup (0 = skip)
  #[serde(default)]
  pub seed_banners: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
  #[serde(default = "default_host")]
  pub host: String,
  #[serde(default = "default_http_port")]
  pub port: u16,
  /// Use ["*"] for permissive mode, or list origins like ["http://localhost:3000"]
  #[serde(default = "default_cors_origins")]
  pub cors_origins: Vec<String>,
}

fn default_host() -> String {
  "0.0.0.0".into()
}

fn default_http_port() -> u16 {
  8080
}

fn default_cors_origins() -> Vec<String> {
  vec!["*".to_string()]
}

impl Default for ServerSection {
  fn default() -> Self {
    Self {
      host: default_host(),
      port: default_http_port(),
      cors_origins: default_cors_origins(),
    }
  }
}

/// Write-behind flusher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickFlusherSection {
  /// Idle time in seconds before queued clicks are written
  #[serde(default = "default_flush_interval")]
  pub interval: u64,

  /// Queue length that triggers an immediate write
  #[serde(default = "default_batch_size")]
  pub batch_size: usize,

  /// Deadline for a single batch write in milliseconds (0 = none)
  #[serde(default)]
  pub flush_timeout_ms: u64,
}

fn default_flush_interval() -> u64 {
  5
}

fn default_batch_size() -> usize {
  1000
}

impl Default for ClickFlusherSection {
  fn default() -> Self {
    Self {
      interval: default_flush_interval(),
      batch_size: default_batch_size(),
      flush_timeout_ms: 0,
    }
  }
}

impl ClickFlusherSection {
  pub fn buffer_config(&self) -> BufferConfig {
    let config = BufferConfig::new(self.batch_size, Duration::from_secs(self.interval));
    if self.flush_timeout_ms > 0 {
      config.with_flush_timeout(Duration::from_millis(self.flush_timeout_ms))
    } else {
      config
    }
  }
}

/// Rate limiting and request limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSection {
  /// Maximum requests per second per client IP (0 = unlimited)
  #[serde(default = "default_requests_per_second")]
  pub requests_per_second: u32,

  /// Burst size for rate limiting
  #[serde(default = "default_burst_size")]
  pub burst_size: u32,

  /// Request timeout in milliseconds (0 = no timeout)
  #[serde(default = "default_request_timeout_ms")]
  pub request_timeout_ms: u64,
}

fn default_requests_per_second() -> u32 {
  5000
}
fn default_burst_size() -> u32 {
  10000
}
fn default_request_timeout_ms() -> u64 {
  30000 // 30 seconds
}

impl Default for LimitsSection {
  fn default() -> Self {
    Self {
      requests_per_second: default_requests_per_second(),
      burst_size: default_burst_size(),
      request_timeout_ms: default_request_timeout_ms(),
    }
  }
}

impl LimitsSection {
  pub fn request_timeout(&self) -> Option<Duration> {
    if self.request_timeout_ms == 0 {
      None
    } else {
      Some(Duration::from_millis(self.request_timeout_ms))
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresSection {
  #[serde(default = "default_pg_url")]
  pub url: String,
  #[serde(default = "default_max_conn")]
  pub max_connections: usize,
}
fn default_pg_url() -> String {
  "postgres://localhost/clickcounter".into()
}
fn default_max_conn() -> usize {
  20
}
impl Default for PostgresSection {
  fn default() -> Self {
    Self {
      url: default_pg_url(),
      max_connections: default_max_conn(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteSection {
  #[serde(default = "default_sqlite_path")]
  pub path: String,
}
fn default_sqlite_path() -> String {
  "clickcounter.db".into()
}
impl Default for SqliteSection {
  fn default() -> Self {
    Self {
      path: default_sqlite_path(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
  #[default]
  Json,
  Pretty,
}

impl std::str::FromStr for LogFormat {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "json" => Ok(LogFormat::Json),
      "pretty" | "text" => Ok(LogFormat::Pretty),
      _ => Err(format!("Unknown log format: {}", s)),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
  #[serde(default = "default_level")]
  pub level: String,
  #[serde(default)]
  pub format: LogFormat,
}
fn default_level() -> String {
  "info".into()
}
impl Default for LoggingSection {
  fn default() -> Self {
    Self {
      level: default_level(),
      format: LogFormat::default(),
    }
  }
}

impl ServerConfig {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
    let content = std::fs::read_to_string(&path)?;
    Self::from_yaml(&content)
  }

  pub fn from_yaml(content: &str) -> Result<Self, anyhow::Error> {
    let expanded = expand_env_vars(content);
    Ok(serde_yaml::from_str(&expanded)?)
  }

  /// `CLICKCOUNTER_CONFIG_PATH` first, then the well-known file names
  pub fn find_and_load() -> Result<Option<Self>, anyhow::Error> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
      if !path.is_empty() {
        tracing::info!("Loading config from {}", path);
        return Ok(Some(Self::from_file(path)?));
      }
    }

    for p in CONFIG_CANDIDATES {
      if Path::new(p).exists() {
        tracing::info!("Loading config from {}", p);
        return Ok(Some(Self::from_file(PathBuf::from(p))?));
      }
    }
    Ok(None)
  }

  pub fn validate(&self) -> Result<(), anyhow::Error> {
    if self.server.port == 0 {
      anyhow::bail!("server.port must be greater than zero");
    }
    self.cache.validate().map_err(anyhow::Error::msg)?;
    if self.click_flusher.interval == 0 {
      anyhow::bail!("click_flusher.interval must be greater than zero");
    }
    Ok(())
  }

  pub fn address(&self) -> String {
    format!("{}:{}", self.server.host, self.server.port)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_expand_env_vars() {
    std::env::set_var("CLICKCOUNTER_TEST_DB", "bannerdb");
    assert_eq!(
      expand_env_vars("postgres://localhost/${CLICKCOUNTER_TEST_DB}"),
      "postgres://localhost/bannerdb"
    );
    assert_eq!(
      expand_env_vars("path: $CLICKCOUNTER_TEST_DB/x"),
      "path: bannerdb/x"
    );
    assert_eq!(expand_env_vars("unterminated ${"), "unterminated ${");
    assert_eq!(expand_env_vars("price: 5$ total"), "price: 5$ total");
  }

  #[test]
  fn test_expand_env_vars_non_ascii() {
    std::env::set_var("CLICKCOUNTER_TEST_HOST", "db.local");
    assert_eq!(
      expand_env_vars("# Настройки сервера\nhost: $CLICKCOUNTER_TEST_HOST # é\n"),
      "# Настройки сервера\nhost: db.local # é\n"
    );
    assert_eq!(expand_env_vars("ключ: $Ж"), "ключ: $Ж");
  }

  #[test]
  fn test_log_format_parse() {
    assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
    assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Pretty));
    assert!("xml".parse::<LogFormat>().is_err());
  }
}
