use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::{
  http::{header, HeaderMap, StatusCode},
  middleware::{self, Next},
  response::{IntoResponse, Response},
  routing::{get, post},
  Extension, Json, Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::ServerConfig;
use super::rate_limiter::RateLimiter;
use crate::batch::{ClickBuffer, ClickError};
use crate::cache::{BannerCache, InMemoryCacheStore, StatsCache};
use crate::db::{DatabaseBackend, Repositories};
use crate::metrics::Metrics;
use crate::service::{BannerService, ClickService, ServiceError, StatsService};
use crate::types::{ClickMetadata, MinuteStat, PeriodError};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
  pub clicks: Arc<ClickService>,
  pub stats: Arc<StatsService>,
  pub backend: Arc<dyn DatabaseBackend>,
  pub store: Arc<InMemoryCacheStore>,
  pub metrics: Arc<Metrics>,
  pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
  /// Wire caches, buffer and services over one backend.
  ///
  /// Starts the cache sweeper and the flush timer, so it must run inside a
  /// tokio runtime.
  pub fn build(config: &ServerConfig, repos: Repositories, metrics: Arc<Metrics>) -> Self {
    let store = InMemoryCacheStore::with_sweeper(config.cache.cleanup_interval());
    let banner_cache = BannerCache::new(store.clone(), config.cache.banner_ttl());
    let stats_cache = StatsCache::new(store.clone(), config.cache.stats_ttl());

    let banners = Arc::new(BannerService::new(
      banner_cache,
      repos.banners,
      metrics.clone(),
    ));
    let stats = Arc::new(StatsService::new(
      banners.clone(),
      stats_cache,
      repos.stats,
      metrics.clone(),
    ));
    let buffer = ClickBuffer::new(
      repos.sink,
      config.click_flusher.buffer_config(),
      metrics.clone(),
    );
    let clicks = Arc::new(ClickService::new(banners, buffer));

    Self {
      clicks,
      stats,
      backend: repos.backend,
      store,
      metrics,
      rate_limiter: Arc::new(RateLimiter::new(&config.limits)),
    }
  }
}

/// Resolved client address, set by the rate limiting middleware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

pub fn router(state: AppState, config: &ServerConfig) -> Router {
  let api = Router::new()
    .route("/counter/{banner_id}", get(register_click))
    .route("/stats/{banner_id}", post(get_stats))
    .route("/api/v1/counter/{banner_id}", get(register_click))
    .route("/api/v1/stats/{banner_id}", post(get_stats))
    .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

  let mut app = Router::new()
    .route("/health", get(health_check))
    .route("/metrics", get(metrics_snapshot))
    .merge(api)
    .layer(middleware::from_fn_with_state(state.clone(), track_requests));

  if let Some(timeout) = config.limits.request_timeout() {
    app = app.layer(TimeoutLayer::new(timeout));
  }

  let cors = if config.server.cors_origins.is_empty()
    || config.server.cors_origins.iter().any(|o| o == "*")
  {
    CorsLayer::permissive()
  } else {
    let origins: Vec<_> = config
      .server
      .cors_origins
      .iter()
      .filter_map(|o| o.parse().ok())
      .collect();
    CorsLayer::new()
      .allow_origin(origins)
      .allow_methods(Any)
      .allow_headers(Any)
  };

  app
    .layer(cors)
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// =============================================================================
// Middleware
// =============================================================================

async fn track_requests(State(state): State<AppState>, req: Request, next: Next) -> Response {
  let response = next.run(req).await;
  state
    .metrics
    .record_request(response.status().is_server_error());
  response
}

async fn rate_limit(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
  let peer = req
    .extensions()
    .get::<ConnectInfo<SocketAddr>>()
    .map(|ConnectInfo(addr)| addr.ip());
  let ip = client_ip(req.headers(), peer);

  if let Err(e) = state.rate_limiter.check_request(ip) {
    state.metrics.record_rate_limited();
    tracing::debug!("Rejected request from {}: {}", ip, e);
    return ApiError::new(
      StatusCode::TOO_MANY_REQUESTS,
      e.to_string(),
      "Too many requests, please slow down",
    )
    .into_response();
  }

  req.extensions_mut().insert(ClientIp(ip));
  next.run(req).await
}

/// X-Forwarded-For, then X-Real-IP, then the socket peer
fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> IpAddr {
  let forwarded = headers
    .get("x-forwarded-for")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .and_then(|v| v.trim().parse().ok());
  let real = || {
    headers
      .get("x-real-ip")
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.trim().parse().ok())
  };

  forwarded
    .or_else(real)
    .or(peer)
    .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ClickResponse {
  pub success: bool,
  pub banner_id: i64,
  pub message: String,
  pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct StatsRequest {
  pub from: String,
  pub to: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsBody {
  pub stats: Vec<MinuteStat>,
}

fn parse_banner_id(raw: &str) -> Result<i64, ApiError> {
  let id: i64 = raw.parse().map_err(|_| {
    ApiError::bad_request("invalid banner ID", "Banner ID must be a valid integer")
  })?;
  if id <= 0 {
    return Err(ApiError::bad_request(
      "invalid banner ID",
      "Banner ID must be positive",
    ));
  }
  Ok(id)
}

fn parse_rfc3339(value: &str, field: &str) -> Result<DateTime<Utc>, ApiError> {
  DateTime::parse_from_rfc3339(value)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|_| {
      ApiError::bad_request(
        "invalid time format, expected RFC3339",
        format!("Invalid '{}' time format, expected RFC3339", field),
      )
    })
}

async fn register_click(
  State(state): State<AppState>,
  Extension(ClientIp(ip)): Extension<ClientIp>,
  Path(raw_id): Path<String>,
  headers: HeaderMap,
) -> Result<Json<ClickResponse>, ApiError> {
  let banner_id = parse_banner_id(&raw_id)?;
  let user_agent = headers
    .get(header::USER_AGENT)
    .and_then(|v| v.to_str().ok())
    .unwrap_or_default();

  let click = state
    .clicks
    .register(banner_id, ClickMetadata::new(ip.to_string(), user_agent))
    .await
    .map_err(|e| {
      tracing::error!("Failed to register click for banner {}: {}", banner_id, e);
      ApiError::from_service(e, "Internal server error while registering click")
    })?;

  tracing::debug!("Click registered for banner {}", banner_id);
  Ok(Json(ClickResponse {
    success: true,
    banner_id,
    message: "Click registered successfully".into(),
    timestamp: click.timestamp().to_rfc3339_opts(SecondsFormat::Secs, true),
  }))
}

async fn get_stats(
  State(state): State<AppState>,
  Path(raw_id): Path<String>,
  body: Result<Json<StatsRequest>, JsonRejection>,
) -> Result<Json<StatsBody>, ApiError> {
  let banner_id = parse_banner_id(&raw_id)?;
  let Json(req) = body.map_err(|e| ApiError::bad_request(e.body_text(), "Invalid request body format"))?;
  let from = parse_rfc3339(&req.from, "from")?;
  let to = parse_rfc3339(&req.to, "to")?;

  let response = state
    .stats
    .get_stats(banner_id, from, to)
    .await
    .map_err(|e| {
      tracing::error!("Failed to get stats for banner {}: {}", banner_id, e);
      ApiError::from_service(e, "Internal server error while getting stats")
    })?;

  Ok(Json(StatsBody {
    stats: response.stats,
  }))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
  status: &'static str,
  timestamp: String,
  services: BTreeMap<String, String>,
}

async fn health_check(State(state): State<AppState>) -> Response {
  let mut services = BTreeMap::new();
  let backend = state.backend.name().to_string();

  let healthy = match tokio::time::timeout(HEALTH_TIMEOUT, state.backend.ping()).await {
    Ok(Ok(())) => {
      services.insert(backend, "healthy".to_string());
      true
    }
    Ok(Err(e)) => {
      tracing::error!("{} health check failed: {}", backend, e);
      services.insert(backend, format!("unhealthy: {}", e));
      false
    }
    Err(_) => {
      tracing::error!("{} health check timed out", backend);
      services.insert(backend, "unhealthy: timed out".to_string());
      false
    }
  };
  services.insert("application".to_string(), "healthy".to_string());

  let (status, label) = if healthy {
    (StatusCode::OK, "ok")
  } else {
    (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
  };
  let body = HealthResponse {
    status: label,
    timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    services,
  };
  (status, Json(body)).into_response()
}

async fn metrics_snapshot(State(state): State<AppState>) -> impl IntoResponse {
  Json(serde_json::json!({
    "requests": state.metrics.snapshot(),
    "cache": state.store.info(),
    "pending_clicks": state.clicks.buffer().pending_len(),
    "rate_limited_clients": state.rate_limiter.tracked_clients(),
  }))
}

// =============================================================================
// Errors
// =============================================================================

/// JSON error body: `{error, code, message}`
#[derive(Debug)]
pub struct ApiError {
  status: StatusCode,
  error: String,
  message: String,
}

impl ApiError {
  pub fn new(status: StatusCode, error: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      status,
      error: error.into(),
      message: message.into(),
    }
  }

  fn bad_request(error: impl Into<String>, message: impl Into<String>) -> Self {
    Self::new(StatusCode::BAD_REQUEST, error, message)
  }

  /// `internal` is the message used when the failure is on our side
  fn from_service(e: ServiceError, internal: &str) -> Self {
    let error = e.to_string();
    match e {
      ServiceError::InvalidIdentifier(_) => Self::bad_request(error, "Banner ID must be positive"),
      ServiceError::BannerNotFound(_) => Self::new(
        StatusCode::NOT_FOUND,
        error,
        "Banner with specified ID not found",
      ),
      ServiceError::InvalidPeriod(PeriodError::Inverted) => {
        Self::bad_request(error, "Invalid time range parameters")
      }
      ServiceError::InvalidPeriod(PeriodError::TooLarge) => {
        Self::bad_request(error, "Time period is too large")
      }
      ServiceError::Click(ClickError::InvalidIdentifier(_)) => {
        Self::bad_request(error, "Banner ID must be positive")
      }
      ServiceError::Click(ClickError::SinkFailure { .. }) | ServiceError::Backend(_) => {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error, internal)
      }
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let body = serde_json::json!({
      "error": self.error,
      "code": self.status.as_u16(),
      "message": self.message,
    });
    (self.status, Json(body)).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::http::HeaderValue;

  #[test]
  fn test_client_ip_precedence() {
    let peer = Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 9)));
    let mut headers = HeaderMap::new();
    assert_eq!(client_ip(&headers, peer), peer.unwrap());
    assert_eq!(
      client_ip(&headers, None),
      IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    );

    headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
    assert_eq!(client_ip(&headers, peer).to_string(), "10.0.0.2");

    headers.insert(
      "x-forwarded-for",
      HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
    );
    assert_eq!(client_ip(&headers, peer).to_string(), "203.0.113.7");
  }

  #[test]
  fn test_parse_banner_id() {
    assert_eq!(parse_banner_id("12").unwrap(), 12);
    assert_eq!(parse_banner_id("0").unwrap_err().status, StatusCode::BAD_REQUEST);
    assert_eq!(parse_banner_id("abc").unwrap_err().status, StatusCode::BAD_REQUEST);
  }
}
