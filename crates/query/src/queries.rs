//! Cached read path over the offer catalog.
//!
//! Wraps any `OfferReader` with a serialize-and-admit cache. Results that
//! fit the per-entry budget are stored under the "pricing" tag; results
//! that do not are served straight from the reader, so callers see the
//! same data either way. After a catalog rewrite the ingest path calls
//! `invalidate_pricing` to drop every cached read at once.

use crate::cache::{CacheError, TagCache};
use anyhow::Result;
use async_trait::async_trait;
use gpuatlas_data::{FilteredOffers, OfferCatalogStore, OfferFacets, OfferQuery};
use std::time::Duration;

/// Tag shared by every cache entry derived from the offer catalog.
pub const PRICING_TAG: &str = "pricing";

/// Source of truth for catalog reads.
#[async_trait]
pub trait OfferReader: Send + Sync {
    /// # Errors
    /// Returns an error if the underlying read fails.
    async fn get_filtered(&self, query: &OfferQuery) -> Result<FilteredOffers>;

    /// # Errors
    /// Returns an error if the underlying read fails.
    async fn get_facets(&self) -> Result<OfferFacets>;
}

#[async_trait]
impl OfferReader for OfferCatalogStore {
    async fn get_filtered(&self, query: &OfferQuery) -> Result<FilteredOffers> {
        self.get_offers_filtered(query).await
    }

    async fn get_facets(&self) -> Result<OfferFacets> {
        OfferCatalogStore::get_facets(self).await
    }
}

/// Caching decorator over an `OfferReader`.
pub struct CachedOfferQueries<R, C> {
    reader: R,
    cache: C,
    ttl: Duration,
}

impl<R: OfferReader, C: TagCache> CachedOfferQueries<R, C> {
    pub fn new(reader: R, cache: C, ttl: Duration) -> Self {
        Self { reader, cache, ttl }
    }

    /// Returns filtered offers, from cache when a fresh entry exists.
    ///
    /// The cache key is the serialized query, so any change to a filter,
    /// sort, or page produces a distinct entry.
    ///
    /// # Errors
    /// Returns an error if the underlying read fails. Cache faults never
    /// surface to the caller.
    pub async fn get_filtered(&self, query: &OfferQuery) -> Result<FilteredOffers> {
        let key = match serde_json::to_string(query) {
            Ok(encoded) => format!("offers:filtered:{encoded}"),
            Err(err) => {
                tracing::warn!(%err, "query not cacheable, reading directly");
                return self.reader.get_filtered(query).await;
            }
        };
        self.read_through(&key, || self.reader.get_filtered(query))
            .await
    }

    /// Returns catalog facets, from cache when a fresh entry exists.
    ///
    /// # Errors
    /// Returns an error if the underlying read fails.
    pub async fn get_facets(&self) -> Result<OfferFacets> {
        self.read_through("offers:facets", || self.reader.get_facets())
            .await
    }

    /// Drops every cached catalog read. Called after a catalog rewrite
    /// commits.
    pub async fn invalidate_pricing(&self) -> u64 {
        let removed = self.cache.invalidate_tag(PRICING_TAG).await;
        tracing::debug!(removed, "pricing cache invalidated");
        removed
    }

    async fn read_through<T, F, Fut>(&self, key: &str, load: F) -> Result<T>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if let Some(cached) = self.cache.get(key).await {
            match serde_json::from_str(&cached) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    tracing::warn!(key, %err, "discarding undecodable cache entry");
                }
            }
        }

        let value = load().await?;

        match serde_json::to_string(&value) {
            Ok(encoded) => match self.cache.set(key, encoded, &[PRICING_TAG], self.ttl).await {
                Ok(()) => {}
                Err(CacheError::SizeLimit { size, limit }) => {
                    tracing::debug!(key, size, limit, "result too large to cache");
                }
                Err(err) => {
                    tracing::warn!(key, %err, "cache write failed");
                }
            },
            Err(err) => {
                tracing::warn!(key, %err, "result not serializable for cache");
            }
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryTagCache;
    use chrono::{TimeZone, Utc};
    use gpuatlas_data::OfferRecord;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(60);

    fn record(provider: &str) -> OfferRecord {
        OfferRecord {
            id: format!("{provider}-id"),
            stable_key: format!("{provider}:nvidia h100 sxm:8x:virtual machine"),
            provider: provider.to_string(),
            instance_id: None,
            sku: None,
            gpu_model: "NVIDIA H100 SXM".to_string(),
            gpu_count: Some(8),
            vram_gb: Some(80),
            vcpus: Some(208),
            system_ram_gb: Some(dec!(1800)),
            storage: None,
            price_hour_usd: Some(dec!(23.92)),
            price_unit: "instance_hour".to_string(),
            class: "GPU".to_string(),
            deployment: "Virtual Machine".to_string(),
            source_url: "https://example.com/pricing".to_string(),
            source_hash: "abc".to_string(),
            observed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    struct CountingReader {
        filtered_calls: AtomicUsize,
        facet_calls: AtomicUsize,
    }

    impl CountingReader {
        fn new() -> Self {
            Self {
                filtered_calls: AtomicUsize::new(0),
                facet_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl OfferReader for CountingReader {
        async fn get_filtered(&self, _query: &OfferQuery) -> Result<FilteredOffers> {
            self.filtered_calls.fetch_add(1, Ordering::SeqCst);
            Ok(FilteredOffers {
                offers: vec![record("lambda")],
                total: 1,
                page: 1,
                per_page: 50,
            })
        }

        async fn get_facets(&self) -> Result<OfferFacets> {
            self.facet_calls.fetch_add(1, Ordering::SeqCst);
            Ok(OfferFacets {
                providers: vec![],
                gpu_models: vec![],
                min_price_hour_usd: Some(dec!(1.25)),
                max_price_hour_usd: Some(dec!(23.92)),
            })
        }
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let queries =
            CachedOfferQueries::new(CountingReader::new(), MemoryTagCache::new(1 << 20), TTL);
        let query = OfferQuery::default();

        let first = queries.get_filtered(&query).await.unwrap();
        let second = queries.get_filtered(&query).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(queries.reader.filtered_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_queries_get_distinct_entries() {
        let queries =
            CachedOfferQueries::new(CountingReader::new(), MemoryTagCache::new(1 << 20), TTL);

        queries.get_filtered(&OfferQuery::default()).await.unwrap();
        queries
            .get_filtered(&OfferQuery {
                providers: vec!["vultr".to_string()],
                ..OfferQuery::default()
            })
            .await
            .unwrap();

        assert_eq!(queries.reader.filtered_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn oversized_result_falls_back_to_direct_reads() {
        // Budget far below any serialized result: the value is served from
        // the reader every time and the payload is byte-identical to the
        // cached path's.
        let queries = CachedOfferQueries::new(CountingReader::new(), MemoryTagCache::new(8), TTL);
        let query = OfferQuery::default();

        let first = queries.get_filtered(&query).await.unwrap();
        let second = queries.get_filtered(&query).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(queries.reader.filtered_calls.load(Ordering::SeqCst), 2);
        assert!(queries.cache.is_empty().await);
    }

    #[tokio::test]
    async fn invalidation_forces_a_fresh_read() {
        let queries =
            CachedOfferQueries::new(CountingReader::new(), MemoryTagCache::new(1 << 20), TTL);
        let query = OfferQuery::default();

        queries.get_filtered(&query).await.unwrap();
        queries.get_facets().await.unwrap();
        let removed = queries.invalidate_pricing().await;
        assert_eq!(removed, 2);

        queries.get_filtered(&query).await.unwrap();
        queries.get_facets().await.unwrap();
        assert_eq!(queries.reader.filtered_calls.load(Ordering::SeqCst), 2);
        assert_eq!(queries.reader.facet_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_triggers_a_reload() {
        let queries = CachedOfferQueries::new(
            CountingReader::new(),
            MemoryTagCache::new(1 << 20),
            Duration::from_secs(10),
        );
        let query = OfferQuery::default();

        queries.get_filtered(&query).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        queries.get_filtered(&query).await.unwrap();

        assert_eq!(queries.reader.filtered_calls.load(Ordering::SeqCst), 2);
    }
}
