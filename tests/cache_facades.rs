use chrono::{DateTime, TimeZone, Utc};
use clickcounter::cache::{BannerCache, CacheError, CacheValue, InMemoryCacheStore, StatsCache};
use clickcounter::types::{Banner, MinuteStat, StatPeriod, StatsResponse};
use std::sync::Arc;
use std::time::Duration;

fn banner(id: i64, is_active: bool) -> Banner {
  let now = Utc.with_ymd_and_hms(2024, 12, 12, 10, 0, 0).unwrap();
  Banner {
    id,
    name: format!("Banner {}", id),
    created_at: now,
    updated_at: now,
    is_active,
  }
}

fn at(minute: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 12, 12, 10, minute, 0).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_banner_entry_expires_after_ttl() {
  let store = Arc::new(InMemoryCacheStore::new());
  let cache = BannerCache::new(store, Duration::from_secs(5));
  cache.set(&banner(1, true)).unwrap();

  tokio::time::advance(Duration::from_millis(4900)).await;
  assert_eq!(cache.get(1).unwrap(), banner(1, true));

  tokio::time::advance(Duration::from_millis(200)).await;
  assert!(matches!(cache.get(1), Err(CacheError::NotFound)));
}

#[tokio::test]
async fn test_banner_miss_and_delete() {
  let store = Arc::new(InMemoryCacheStore::new());
  let cache = BannerCache::new(store, Duration::from_secs(60));

  assert!(matches!(cache.get(9), Err(CacheError::NotFound)));
  cache.set(&banner(9, false)).unwrap();
  assert!(!cache.get(9).unwrap().is_active);
  assert!(cache.delete(9));
  assert!(matches!(cache.get(9), Err(CacheError::NotFound)));
}

#[tokio::test]
async fn test_banner_clear_leaves_other_keys() {
  let store = Arc::new(InMemoryCacheStore::new());
  let banners = BannerCache::new(store.clone(), Duration::from_secs(60));
  let stats = StatsCache::new(store.clone(), Duration::from_secs(60));

  for id in 1..=3 {
    banners.set(&banner(id, true)).unwrap();
  }
  let period = StatPeriod::new(at(0), at(5)).unwrap();
  stats.set(&StatsResponse::new(1, period, vec![])).unwrap();
  store.set("other", CacheValue::Integer(1), Duration::from_secs(60));

  assert_eq!(banners.clear(), 3);
  assert_eq!(store.len(), 2);
  assert!(stats.get(1, at(0), at(5)).is_ok());
}

#[tokio::test]
async fn test_wrong_variant_is_type_mismatch() {
  let store = Arc::new(InMemoryCacheStore::new());
  let cache = BannerCache::new(store.clone(), Duration::from_secs(60));

  store.set(&BannerCache::key(4), CacheValue::Integer(1), Duration::from_secs(60));
  match cache.get(4) {
    Err(CacheError::TypeMismatch { expected, found }) => {
      assert_eq!(expected, "json");
      assert_eq!(found, "integer");
    }
    other => panic!("expected type mismatch, got {:?}", other),
  }
}

#[tokio::test]
async fn test_malformed_json_is_serialization_error() {
  let store = Arc::new(InMemoryCacheStore::new());
  let cache = StatsCache::new(store.clone(), Duration::from_secs(60));

  store.set(
    &StatsCache::key(1, at(0), at(1)),
    CacheValue::Json(serde_json::json!({"banner_id": "not a number"})),
    Duration::from_secs(60),
  );
  assert!(matches!(
    cache.get(1, at(0), at(1)),
    Err(CacheError::Serialization(_))
  ));
}

#[tokio::test]
async fn test_stats_keyed_by_exact_period() {
  let store = Arc::new(InMemoryCacheStore::new());
  let cache = StatsCache::new(store, Duration::from_secs(60));

  let period = StatPeriod::new(at(0), at(10)).unwrap();
  let response = StatsResponse::new(
    2,
    period,
    vec![MinuteStat::new(at(3), 4), MinuteStat::new(at(1), 1)],
  );
  cache.set(&response).unwrap();

  let cached = cache.get(2, at(0), at(10)).unwrap();
  assert_eq!(cached, response);
  assert_eq!(cached.total, 5);

  // No partial-range matching
  assert!(matches!(cache.get(2, at(0), at(9)), Err(CacheError::NotFound)));
  assert!(matches!(cache.get(3, at(0), at(10)), Err(CacheError::NotFound)));

  assert!(cache.delete(2, at(0), at(10)));
  assert!(matches!(cache.get(2, at(0), at(10)), Err(CacheError::NotFound)));
}
