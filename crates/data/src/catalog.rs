//! Offer catalog repository.
//!
//! The catalog holds exactly one generation of deduplicated offers. Ingest
//! is wipe-and-replace: `replace_all` deletes every row and inserts the new
//! generation inside a single transaction, so readers observe either the
//! old catalog or the new one, never a mix.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use gpuatlas_core::{CanonicalOffer, DeploymentType, OfferingClass};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

/// Page size bounds applied to every catalog query.
const MIN_PER_PAGE: u32 = 1;
const MAX_PER_PAGE: u32 = 200;
const DEFAULT_PER_PAGE: u32 = 50;

/// One provider's deduplicated offers heading into the catalog.
#[derive(Debug, Clone)]
pub struct OfferBatch {
    pub provider: String,
    pub source_hash: String,
    pub offers: Vec<CanonicalOffer>,
}

/// One persisted catalog row.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct OfferRecord {
    /// Audit hash of the originating row; also the primary key.
    pub id: String,
    pub stable_key: String,
    pub provider: String,
    pub instance_id: Option<String>,
    pub sku: Option<String>,
    pub gpu_model: String,
    pub gpu_count: Option<i32>,
    pub vram_gb: Option<i32>,
    pub vcpus: Option<i32>,
    pub system_ram_gb: Option<Decimal>,
    pub storage: Option<String>,
    pub price_hour_usd: Option<Decimal>,
    pub price_unit: String,
    pub class: String,
    pub deployment: String,
    pub source_url: String,
    pub source_hash: String,
    pub observed_at: DateTime<Utc>,
}

/// Result ordering for filtered catalog reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Cheapest first; unpriced offers sort last.
    #[default]
    PriceAsc,
    PriceDesc,
    Provider,
    GpuModel,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            Self::PriceAsc => "price_hour_usd ASC NULLS LAST, stable_key ASC",
            Self::PriceDesc => "price_hour_usd DESC NULLS LAST, stable_key ASC",
            Self::Provider => "provider ASC, price_hour_usd ASC NULLS LAST",
            Self::GpuModel => "gpu_model ASC, price_hour_usd ASC NULLS LAST",
        }
    }
}

/// Filter and pagination parameters for a catalog read.
///
/// Serializes deterministically, which lets the query layer use the encoded
/// form as a cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfferQuery {
    /// Providers to include; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<String>,
    /// Case-insensitive substring match on the normalized model name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<OfferingClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_gpu_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_vram_gb: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_vram_gb: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price_hour_usd: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price_hour_usd: Option<Decimal>,
    /// Case-insensitive term matched against every descriptive text column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: SortOrder,
    /// 1-based page number; zero is treated as one.
    #[serde(default)]
    pub page: u32,
    /// Clamped to 1..=200; zero falls back to the default of 50.
    #[serde(default)]
    pub per_page: u32,
}

impl OfferQuery {
    fn effective_per_page(&self) -> u32 {
        if self.per_page == 0 {
            DEFAULT_PER_PAGE
        } else {
            self.per_page.clamp(MIN_PER_PAGE, MAX_PER_PAGE)
        }
    }

    fn effective_page(&self) -> u32 {
        self.page.max(1)
    }

    fn push_filters(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        if !self.providers.is_empty() {
            builder
                .push(" AND provider = ANY(")
                .push_bind(self.providers.clone())
                .push(")");
        }
        if let Some(model) = &self.gpu_model {
            builder
                .push(" AND gpu_model ILIKE ")
                .push_bind(format!("%{model}%"));
        }
        if let Some(class) = self.class {
            builder.push(" AND class = ").push_bind(class.as_str());
        }
        if let Some(deployment) = self.deployment {
            builder
                .push(" AND deployment = ")
                .push_bind(deployment.as_str());
        }
        if let Some(min_count) = self.min_gpu_count {
            builder
                .push(" AND gpu_count >= ")
                .push_bind(i64::from(min_count));
        }
        if let Some(min_vram) = self.min_vram_gb {
            builder
                .push(" AND vram_gb >= ")
                .push_bind(i64::from(min_vram));
        }
        if let Some(max_vram) = self.max_vram_gb {
            builder
                .push(" AND vram_gb <= ")
                .push_bind(i64::from(max_vram));
        }
        if let Some(min_price) = self.min_price_hour_usd {
            builder
                .push(" AND price_hour_usd >= ")
                .push_bind(min_price);
        }
        if let Some(max_price) = self.max_price_hour_usd {
            builder
                .push(" AND price_hour_usd <= ")
                .push_bind(max_price);
        }
        if let Some(term) = &self.search {
            let pattern = format!("%{term}%");
            builder.push(" AND (");
            for (i, column) in [
                "provider",
                "gpu_model",
                "instance_id",
                "sku",
                "storage",
                "deployment",
                "price_unit",
                "gpu_count::text",
                "vram_gb::text",
                "vcpus::text",
                "price_hour_usd::text",
            ]
            .iter()
            .enumerate()
            {
                if i > 0 {
                    builder.push(" OR ");
                }
                builder
                    .push(*column)
                    .push(" ILIKE ")
                    .push_bind(pattern.clone());
            }
            builder.push(")");
        }
    }
}

/// One page of filtered catalog rows plus the unpaginated total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredOffers {
    pub offers: Vec<OfferRecord>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

/// Distinct value with its row count, used for filter menus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetCount {
    pub value: String,
    pub count: i64,
}

/// Aggregated filter options over the current catalog generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferFacets {
    pub providers: Vec<FacetCount>,
    pub gpu_models: Vec<FacetCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price_hour_usd: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price_hour_usd: Option<Decimal>,
}

/// Headline counts for operational reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total_offers: i64,
    pub providers: i64,
    pub priced_offers: i64,
    pub last_observed_at: Option<DateTime<Utc>>,
}

/// Repository for the offer catalog.
#[derive(Debug, Clone)]
pub struct OfferCatalogStore {
    pool: PgPool,
}

impl OfferCatalogStore {
    /// Creates a new store over the shared pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Replaces the entire catalog with a new generation.
    ///
    /// Deletes every existing row, then inserts all offers from every batch
    /// inside one transaction. A failure anywhere rolls back, leaving the
    /// previous generation intact.
    ///
    /// # Returns
    /// The number of offers inserted.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn replace_all(&self, batches: &[OfferBatch]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin catalog transaction")?;

        sqlx::query("DELETE FROM offer_catalog")
            .execute(&mut *tx)
            .await
            .context("failed to clear previous catalog generation")?;

        let mut inserted = 0u64;
        for batch in batches {
            for offer in &batch.offers {
                let row = &offer.row;
                sqlx::query(
                    r"
                    INSERT INTO offer_catalog (
                        id, stable_key, provider, instance_id, sku,
                        gpu_model, gpu_count, vram_gb, vcpus, system_ram_gb,
                        storage, price_hour_usd, price_unit, class, deployment,
                        source_url, source_hash, observed_at
                    )
                    VALUES (
                        $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                        $11, $12, $13, $14, $15, $16, $17, $18
                    )
                    ON CONFLICT (id) DO NOTHING
                    ",
                )
                .bind(&offer.audit_hash)
                .bind(&offer.stable_key)
                .bind(&row.provider)
                .bind(row.instance_id.as_deref())
                .bind(row.sku.as_deref())
                .bind(&row.gpu_model)
                .bind(row.gpu_count.map(|c| c as i32))
                .bind(row.vram_gb.map(|v| v as i32))
                .bind(row.vcpus.map(|v| v as i32))
                .bind(row.system_ram_gb)
                .bind(row.storage.as_deref())
                .bind(row.price_hour_usd)
                .bind(row.price_unit.as_str())
                .bind(row.class.as_str())
                .bind(row.deployment.as_str())
                .bind(&row.source_url)
                .bind(&batch.source_hash)
                .bind(row.observed_at)
                .execute(&mut *tx)
                .await?;
                inserted += 1;
            }
        }

        tx.commit().await.context("failed to commit catalog")?;

        tracing::info!(
            batches = batches.len(),
            inserted,
            "catalog generation replaced"
        );
        Ok(inserted)
    }

    /// Returns one page of offers matching the query, with the unpaginated
    /// match count.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_offers_filtered(&self, query: &OfferQuery) -> Result<FilteredOffers> {
        let per_page = query.effective_per_page();
        let page = query.effective_page();
        let offset = i64::from(page - 1) * i64::from(per_page);

        let mut count_builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM offer_catalog WHERE 1 = 1");
        query.push_filters(&mut count_builder);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT id, stable_key, provider, instance_id, sku, gpu_model, \
             gpu_count, vram_gb, vcpus, system_ram_gb, storage, price_hour_usd, \
             price_unit, class, deployment, source_url, source_hash, observed_at \
             FROM offer_catalog WHERE 1 = 1",
        );
        query.push_filters(&mut builder);
        builder.push(" ORDER BY ").push(query.sort.sql());
        builder.push(" LIMIT ").push_bind(i64::from(per_page));
        builder.push(" OFFSET ").push_bind(offset);

        let offers = builder
            .build_query_as::<OfferRecord>()
            .fetch_all(&self.pool)
            .await?;

        Ok(FilteredOffers {
            offers,
            total,
            page,
            per_page,
        })
    }

    /// Returns distinct providers and models with counts, plus the priced
    /// range, over the whole catalog.
    ///
    /// # Errors
    /// Returns an error if a database query fails.
    pub async fn get_facets(&self) -> Result<OfferFacets> {
        let providers = sqlx::query_as::<_, FacetRow>(
            r"
            SELECT provider AS value, COUNT(*) AS count
            FROM offer_catalog
            GROUP BY provider
            ORDER BY provider ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let gpu_models = sqlx::query_as::<_, FacetRow>(
            r"
            SELECT gpu_model AS value, COUNT(*) AS count
            FROM offer_catalog
            GROUP BY gpu_model
            ORDER BY gpu_model ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let range = sqlx::query(
            "SELECT MIN(price_hour_usd) AS min_price, MAX(price_hour_usd) AS max_price \
             FROM offer_catalog WHERE price_hour_usd IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(OfferFacets {
            providers: providers.into_iter().map(FacetRow::into_count).collect(),
            gpu_models: gpu_models.into_iter().map(FacetRow::into_count).collect(),
            min_price_hour_usd: range.try_get("min_price")?,
            max_price_hour_usd: range.try_get("max_price")?,
        })
    }

    /// Returns headline catalog counts.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn stats(&self) -> Result<CatalogStats> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS total_offers,
                   COUNT(DISTINCT provider) AS providers,
                   COUNT(price_hour_usd) AS priced_offers,
                   MAX(observed_at) AS last_observed_at
            FROM offer_catalog
            ",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CatalogStats {
            total_offers: row.try_get("total_offers")?,
            providers: row.try_get("providers")?,
            priced_offers: row.try_get("priced_offers")?,
            last_observed_at: row.try_get("last_observed_at")?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FacetRow {
    value: String,
    count: i64,
}

impl FacetRow {
    fn into_count(self) -> FacetCount {
        FacetCount {
            value: self.value,
            count: self.count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_page_clamps_to_bounds() {
        let mut query = OfferQuery {
            per_page: 1000,
            ..OfferQuery::default()
        };
        assert_eq!(query.effective_per_page(), 200);

        query.per_page = 0;
        assert_eq!(query.effective_per_page(), 50);

        query.per_page = 25;
        assert_eq!(query.effective_per_page(), 25);
    }

    #[test]
    fn page_zero_is_treated_as_first_page() {
        let query = OfferQuery::default();
        assert_eq!(query.effective_page(), 1);
    }

    #[test]
    fn query_serialization_is_stable_for_cache_keys() {
        let query = OfferQuery {
            providers: vec!["lambda".to_string()],
            max_price_hour_usd: Some(Decimal::new(250, 2)),
            ..OfferQuery::default()
        };
        let a = serde_json::to_string(&query).unwrap();
        let b = serde_json::to_string(&query).unwrap();
        assert_eq!(a, b);
        assert!(a.contains("lambda"));
    }

    #[test]
    fn empty_filters_are_omitted_from_cache_keys() {
        let encoded = serde_json::to_string(&OfferQuery::default()).unwrap();
        assert!(!encoded.contains("providers"));
        assert!(!encoded.contains("search"));
    }

    #[test]
    fn default_sort_is_cheapest_first() {
        assert_eq!(SortOrder::default(), SortOrder::PriceAsc);
        assert!(SortOrder::PriceAsc.sql().contains("ASC NULLS LAST"));
    }
}
