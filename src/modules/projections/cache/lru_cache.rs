// Bounded, time-aware projection cache.
//
// Purpose
// - Avoid reloading hot projections from the store while bounding memory.
//
// Responsibilities
// - Keep entries in least-recently-used order.
// - Drop entries idle for longer than the maximum retention.
// - Drop the least recently used entries above capacity, but never before the minimum retention.
// - Count hits and misses.

use crate::modules::projections::cache::{ProjectionCache, ProjectionLoader};
use crate::modules::projections::core::errors::ConfigError;
use crate::modules::projections::core::projection::{Projection, ProjectionHandle};
use crate::modules::projections::use_cases::project_transactions::options::env_var;
use crate::shared::infrastructure::store::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOptions {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_minimum_retention_secs")]
    pub minimum_retention_secs: u64,
    #[serde(default = "default_maximum_retention_secs")]
    pub maximum_retention_secs: u64,
}

fn default_capacity() -> usize {
    10_000
}

fn default_minimum_retention_secs() -> u64 {
    60
}

fn default_maximum_retention_secs() -> u64 {
    3_600
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            minimum_retention_secs: default_minimum_retention_secs(),
            maximum_retention_secs: default_maximum_retention_secs(),
        }
    }
}

impl CacheOptions {
    /// Reads `PROJECTOR_CACHE_CAPACITY`, `PROJECTOR_CACHE_MIN_RETENTION_SECS` and
    /// `PROJECTOR_CACHE_MAX_RETENTION_SECS`, falling back to the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let options = Self {
            capacity: env_var("PROJECTOR_CACHE_CAPACITY")?.unwrap_or(defaults.capacity),
            minimum_retention_secs: env_var("PROJECTOR_CACHE_MIN_RETENTION_SECS")?
                .unwrap_or(defaults.minimum_retention_secs),
            maximum_retention_secs: env_var("PROJECTOR_CACHE_MAX_RETENTION_SECS")?
                .unwrap_or(defaults.maximum_retention_secs),
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity < 1 {
            return Err(ConfigError::InvalidCapacity);
        }
        if self.minimum_retention_secs > self.maximum_retention_secs {
            return Err(ConfigError::InvalidRetention);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub current: usize,
}

struct CachedProjection<P: Projection> {
    projection: ProjectionHandle<P>,
    last_accessed: DateTime<Utc>,
}

pub struct LruProjectionCache<P: Projection> {
    entries: Mutex<LruCache<P::Key, CachedProjection<P>>>,
    capacity: usize,
    minimum_retention: Duration,
    maximum_retention: Duration,
    clock: Clock,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<P: Projection> LruProjectionCache<P> {
    pub fn new(
        capacity: usize,
        minimum_retention: Duration,
        maximum_retention: Duration,
    ) -> Result<Self, ConfigError> {
        Self::with_clock(capacity, minimum_retention, maximum_retention, Arc::new(Utc::now))
    }

    pub fn with_clock(
        capacity: usize,
        minimum_retention: Duration,
        maximum_retention: Duration,
        clock: Clock,
    ) -> Result<Self, ConfigError> {
        if capacity < 1 {
            return Err(ConfigError::InvalidCapacity);
        }
        if minimum_retention > maximum_retention {
            return Err(ConfigError::InvalidRetention);
        }
        Ok(Self {
            entries: Mutex::new(LruCache::unbounded()),
            capacity,
            minimum_retention,
            maximum_retention,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn from_options(options: &CacheOptions) -> Result<Self, ConfigError> {
        Self::new(
            options.capacity,
            Duration::from_secs(options.minimum_retention_secs),
            Duration::from_secs(options.maximum_retention_secs),
        )
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub async fn current_count(&self) -> usize {
        let mut entries = self.entries.lock().await;
        self.evict(&mut entries, (self.clock)());
        entries.len()
    }

    pub async fn statistics(&self) -> CacheStatistics {
        CacheStatistics {
            hits: self.hits(),
            misses: self.misses(),
            current: self.current_count().await,
        }
    }

    fn evict(&self, entries: &mut LruCache<P::Key, CachedProjection<P>>, now: DateTime<Utc>) {
        while let Some((_, oldest)) = entries.peek_lru() {
            let idle = (now - oldest.last_accessed).to_std().unwrap_or(Duration::ZERO);
            let expired = idle > self.maximum_retention;
            let over_capacity = entries.len() > self.capacity && idle >= self.minimum_retention;
            if !(expired || over_capacity) {
                break;
            }
            entries.pop_lru();
        }
    }
}

#[async_trait]
impl<P: Projection> ProjectionCache<P> for LruProjectionCache<P> {
    async fn add(&self, projection: ProjectionHandle<P>) {
        let mut entries = self.entries.lock().await;
        if entries.contains(projection.key()) {
            return;
        }
        let now = (self.clock)();
        entries.put(
            projection.key().clone(),
            CachedProjection {
                projection,
                last_accessed: now,
            },
        );
        self.evict(&mut entries, now);
    }

    async fn get<'a>(
        &'a self,
        key: &'a P::Key,
        load: ProjectionLoader<'a, P>,
    ) -> Result<Option<ProjectionHandle<P>>, StoreError> {
        {
            let mut entries = self.entries.lock().await;
            let now = (self.clock)();
            self.evict(&mut entries, now);
            if let Some(cached) = entries.get_mut(key) {
                cached.last_accessed = now;
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(cached.projection.clone()));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let Some(loaded) = load.await? else {
            return Ok(None);
        };

        let mut entries = self.entries.lock().await;
        let now = (self.clock)();
        if let Some(cached) = entries.get_mut(key) {
            cached.last_accessed = now;
            return Ok(Some(cached.projection.clone()));
        }
        entries.put(
            key.clone(),
            CachedProjection {
                projection: loaded.clone(),
                last_accessed: now,
            },
        );
        self.evict(&mut entries, now);
        Ok(Some(loaded))
    }

    async fn remove(&self, key: &P::Key) {
        self.entries.lock().await.pop(key);
    }

    async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[cfg(test)]
mod lru_projection_cache_tests {
    use super::*;
    use crate::shell::catalog::ProductCatalogEntry;
    use crate::tests::fixtures::clock::ManualClock;
    use rstest::{fixture, rstest};
    use std::sync::atomic::AtomicUsize;

    type BeforeEachReturn = (ManualClock, Arc<AtomicUsize>);

    #[fixture]
    fn before_each() -> BeforeEachReturn {
        (ManualClock::new(), Arc::new(AtomicUsize::new(0)))
    }

    fn entry(key: &str) -> ProjectionHandle<ProductCatalogEntry> {
        ProjectionHandle::new(ProductCatalogEntry::with_key(key.to_string()))
    }

    fn loader(
        found: Option<ProjectionHandle<ProductCatalogEntry>>,
        loads: Arc<AtomicUsize>,
    ) -> ProjectionLoader<'static, ProductCatalogEntry> {
        Box::pin(async move {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(found)
        })
    }

    fn cache(
        clock: &ManualClock,
        capacity: usize,
        minimum_retention: Duration,
        maximum_retention: Duration,
    ) -> LruProjectionCache<ProductCatalogEntry> {
        LruProjectionCache::with_clock(
            capacity,
            minimum_retention,
            maximum_retention,
            clock.as_clock(),
        )
        .unwrap()
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_load_once_and_serve_hits_from_memory(before_each: BeforeEachReturn) {
        let (clock, loads) = before_each;
        let cache = cache(&clock, 10, Duration::ZERO, Duration::from_secs(3_600));
        let key = "c350E".to_string();

        let first = cache
            .get(&key, loader(Some(entry("c350E")), loads.clone()))
            .await
            .unwrap()
            .unwrap();
        let second = cache
            .get(&key, loader(Some(entry("c350E")), loads.clone()))
            .await
            .unwrap()
            .unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.current_count().await, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_not_cache_an_absent_projection(before_each: BeforeEachReturn) {
        let (clock, loads) = before_each;
        let cache = cache(&clock, 10, Duration::ZERO, Duration::from_secs(3_600));
        let key = "c350E".to_string();

        for _ in 0..2 {
            let found = cache.get(&key, loader(None, loads.clone())).await.unwrap();
            assert!(found.is_none());
        }

        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_eq!(cache.current_count().await, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_keep_the_first_projection_added_for_a_key(before_each: BeforeEachReturn) {
        let (clock, loads) = before_each;
        let cache = cache(&clock, 10, Duration::ZERO, Duration::from_secs(3_600));
        let original = entry("c350E");
        cache.add(original.clone()).await;
        cache.add(entry("c350E")).await;

        let found = cache
            .get(&"c350E".to_string(), loader(None, loads.clone()))
            .await
            .unwrap()
            .unwrap();

        assert!(found.ptr_eq(&original));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_forget_removed_and_cleared_projections(before_each: BeforeEachReturn) {
        let (clock, _) = before_each;
        let cache = cache(&clock, 10, Duration::ZERO, Duration::from_secs(3_600));
        cache.add(entry("a")).await;
        cache.add(entry("b")).await;
        cache.add(entry("c")).await;

        cache.remove(&"a".to_string()).await;
        assert_eq!(cache.current_count().await, 2);

        cache.clear().await;
        assert_eq!(cache.current_count().await, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_evict_the_least_recently_used_above_capacity(before_each: BeforeEachReturn) {
        let (clock, loads) = before_each;
        let cache = cache(&clock, 2, Duration::ZERO, Duration::from_secs(3_600));
        cache.add(entry("a")).await;
        clock.advance(Duration::from_secs(1));
        cache.add(entry("b")).await;
        clock.advance(Duration::from_secs(1));
        cache
            .get(&"a".to_string(), loader(None, loads.clone()))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(1));
        cache.add(entry("c")).await;

        assert_eq!(cache.current_count().await, 2);
        let b = cache
            .get(&"b".to_string(), loader(None, loads.clone()))
            .await
            .unwrap();
        assert!(b.is_none());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_retain_young_projections_beyond_capacity(before_each: BeforeEachReturn) {
        let (clock, _) = before_each;
        let cache = cache(
            &clock,
            1,
            Duration::from_secs(60),
            Duration::from_secs(3_600),
        );
        cache.add(entry("a")).await;
        cache.add(entry("b")).await;
        assert_eq!(cache.current_count().await, 2);

        clock.advance(Duration::from_secs(120));
        cache.add(entry("c")).await;
        assert_eq!(cache.current_count().await, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_expire_projections_idle_beyond_the_maximum_retention(
        before_each: BeforeEachReturn,
    ) {
        let (clock, loads) = before_each;
        let cache = cache(&clock, 10, Duration::ZERO, Duration::from_secs(600));
        cache.add(entry("a")).await;

        clock.advance(Duration::from_secs(601));
        let found = cache
            .get(&"a".to_string(), loader(None, loads.clone()))
            .await
            .unwrap();

        assert!(found.is_none());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[case(0, 0, 10, ConfigError::InvalidCapacity)]
    #[case(10, 20, 10, ConfigError::InvalidRetention)]
    fn it_should_reject_invalid_settings(
        #[case] capacity: usize,
        #[case] minimum_secs: u64,
        #[case] maximum_secs: u64,
        #[case] expected: ConfigError,
    ) {
        let result = LruProjectionCache::<ProductCatalogEntry>::new(
            capacity,
            Duration::from_secs(minimum_secs),
            Duration::from_secs(maximum_secs),
        );
        assert_eq!(result.err(), Some(expected));
    }

    #[rstest]
    fn it_should_validate_cache_options() {
        assert!(CacheOptions::default().validate().is_ok());
        let options = CacheOptions {
            capacity: 0,
            ..CacheOptions::default()
        };
        assert_eq!(options.validate(), Err(ConfigError::InvalidCapacity));
    }
}
