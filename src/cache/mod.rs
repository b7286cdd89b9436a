//! # Cache Module
//!
//! TTL cache de metadata resuelta, indexada por la consulta normalizada.
//!
//! Keys are the trimmed, lower-cased query or URL; equivalent but differently
//! written queries are separate entries. Entries older than the TTL are never
//! served and are purged by a periodic sweep. When the cache grows past its
//! size bound, the oldest entries are evicted right after the insertion.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::PlayerResult;
use crate::sources::{Extractor, Resolved};

pub const MAX_CACHE_SIZE: usize = 500;
pub const CACHE_TTL: Duration = Duration::from_secs(3600);
/// Entradas eliminadas de golpe cuando se supera el límite.
pub const EVICTION_BATCH: usize = 100;

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Resolved,
    cached_at: Instant,
}

/// Cache de información de canciones
#[derive(Debug)]
pub struct SongCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for SongCache {
    fn default() -> Self {
        Self::new(MAX_CACHE_SIZE, CACHE_TTL)
    }
}

impl SongCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_size: max_size.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn normalize_key(query: &str) -> String {
        query.trim().to_lowercase()
    }

    /// Devuelve la entrada vigente para la consulta, si existe.
    pub fn get(&self, query: &str) -> Option<Resolved> {
        let key = Self::normalize_key(query);
        let entry = self.entries.get(&key)?;
        self.is_fresh(&entry).then(|| entry.data.clone())
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        entry.cached_at.elapsed() < self.ttl
    }

    /// Busca en cache o delega en el extractor y guarda el resultado.
    pub async fn get_or_resolve(
        &self,
        query: &str,
        extractor: &dyn Extractor,
    ) -> PlayerResult<Option<Resolved>> {
        if let Some(data) = self.get(query) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("💾 Cache hit: {}", truncate(query, 50));
            return Ok(Some(data));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let resolved = extractor.resolve(query).await?;
        if let Some(data) = &resolved {
            self.insert(query, data.clone());
        }
        Ok(resolved)
    }

    pub fn insert(&self, query: &str, data: Resolved) {
        self.entries.insert(
            Self::normalize_key(query),
            CacheEntry {
                data,
                cached_at: Instant::now(),
            },
        );
        self.evict_if_needed();
    }

    fn evict_if_needed(&self) {
        if self.entries.len() <= self.max_size {
            return;
        }

        let mut by_age: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().cached_at))
            .collect();
        by_age.sort_by_key(|(_, cached_at)| *cached_at);

        for (key, _) in by_age.into_iter().take(EVICTION_BATCH) {
            self.entries.remove(&key);
        }
        debug!("🧹 Cache recortado, quedan {} entradas", self.entries.len());
    }

    /// Elimina las entradas expiradas y devuelve cuántas se borraron.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| self.is_fresh(entry));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            info!("🧹 Limpiadas {} entradas expiradas del cache", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

/// Métricas básicas del cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{MockExtractor, TrackInfo};
    use pretty_assertions::assert_eq;

    fn resolved(id: &str) -> Resolved {
        Resolved::Track(TrackInfo {
            url: Some(format!("https://cdn.example/{id}")),
            webpage_url: format!("https://www.youtube.com/watch?v={id}"),
            title: id.to_string(),
            duration: Some(60.0),
            thumbnail: None,
            uploader: None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_until_ttl_then_miss() {
        let cache = SongCache::default();
        cache.insert("song", resolved("a"));

        tokio::time::advance(CACHE_TTL - Duration::from_secs(1)).await;
        assert_eq!(cache.get("song"), Some(resolved("a")));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("song"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_at_exact_ttl_is_expired_everywhere() {
        let cache = SongCache::default();
        cache.insert("song", resolved("a"));

        tokio::time::advance(CACHE_TTL).await;
        assert_eq!(cache.get("song"), None);
        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_hit_rate() {
        let metrics = CacheMetrics { hits: 3, misses: 1, entries: 2 };
        assert!((metrics.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheMetrics { hits: 0, misses: 0, entries: 0 }.hit_rate(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_trimmed_and_lowercased() {
        let cache = SongCache::default();
        cache.insert("  Daft Punk  ", resolved("dp"));
        assert_eq!(cache.get("daft punk"), Some(resolved("dp")));
        assert_eq!(cache.get("daft-punk"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_resolve_only_calls_extractor_on_miss() {
        let mut extractor = MockExtractor::new();
        extractor
            .expect_resolve()
            .times(2)
            .returning(|q| Ok(Some(resolved(q))));

        let cache = SongCache::default();
        cache.get_or_resolve("x", &extractor).await.unwrap();
        cache.get_or_resolve("X ", &extractor).await.unwrap();
        assert_eq!(cache.metrics().hits, 1);

        tokio::time::advance(CACHE_TTL + Duration::from_secs(1)).await;
        cache.get_or_resolve("x", &extractor).await.unwrap();
        assert_eq!(cache.metrics().misses, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_results_are_not_cached() {
        let mut extractor = MockExtractor::new();
        extractor.expect_resolve().times(2).returning(|_| Ok(None));

        let cache = SongCache::default();
        assert!(cache.get_or_resolve("nothing", &extractor).await.unwrap().is_none());
        assert!(cache.get_or_resolve("nothing", &extractor).await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_evicts_oldest_batch() {
        let cache = SongCache::new(150, CACHE_TTL);
        for i in 0..151 {
            cache.insert(&format!("q{i}"), resolved("x"));
            tokio::time::advance(Duration::from_millis(10)).await;
        }

        assert_eq!(cache.len(), 51);
        assert!(cache.get("q0").is_none());
        assert!(cache.get("q99").is_none());
        assert!(cache.get("q100").is_some());
        assert!(cache.get("q150").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let cache = SongCache::default();
        cache.insert("old", resolved("old"));
        tokio::time::advance(Duration::from_secs(1800)).await;
        cache.insert("new", resolved("new"));
        tokio::time::advance(Duration::from_secs(1801)).await;

        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.get("new").is_some());
    }
}
