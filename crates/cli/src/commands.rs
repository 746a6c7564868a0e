//! Command implementations wiring the scrape, storage, and query layers.

use anyhow::{anyhow, Context, Result};
use gpuatlas_core::{
    dedupe_lowest_price, normalize_gpu_model, AppConfig, ConfigLoader, DeploymentType,
    OfferingClass, ProviderResult,
};
use gpuatlas_data::{
    DatabaseClient, Granularity, IngestMode, OfferBatch, OfferCatalogStore, OfferQuery, Sample,
    SampleStore, SortOrder,
};
use gpuatlas_orchestrator::{OrchestratorConfig, ScrapeOrchestrator};
use gpuatlas_query::{CachedOfferQueries, MemoryTagCache};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

/// Parsed `query` subcommand arguments.
pub struct QueryArgs {
    pub providers: Vec<String>,
    pub model: Option<String>,
    pub class: Option<String>,
    pub deployment: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub min_gpu_count: Option<u32>,
    pub min_vram: Option<u32>,
    pub max_vram: Option<u32>,
    pub search: Option<String>,
    pub sort: String,
    pub page: u32,
    pub per_page: u32,
}

pub async fn run_scrape(config_path: &str, limit: Option<usize>, dry_run: bool) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;

    let adapters = gpuatlas_adapters::registry(Duration::from_secs(config.scrape.http_timeout_secs))
        .map_err(|err| anyhow!("failed to build adapter registry: {err}"))?;
    let orchestrator = ScrapeOrchestrator::new(
        adapters,
        OrchestratorConfig {
            pacing: Duration::from_millis(config.scrape.pacing_ms),
            adapter_timeout: Duration::from_secs(config.scrape.adapter_timeout_secs),
        },
    );

    let run = orchestrator.scrape_all(limit).await?;

    for summary in &run.summaries {
        if summary.success {
            tracing::info!(
                provider = %summary.provider,
                rows = summary.rows_scraped,
                duration_ms = summary.duration_ms,
                "adapter succeeded"
            );
        } else {
            tracing::warn!(
                provider = %summary.provider,
                duration_ms = summary.duration_ms,
                error = summary.error.as_deref().unwrap_or("unknown"),
                "adapter failed"
            );
        }
    }

    let batches = build_batches(run.provider_results);
    let total_offers: usize = batches.iter().map(|b| b.offers.len()).sum();
    tracing::info!(
        providers = batches.len(),
        offers = total_offers,
        run_hash = %run.source_hash,
        "scrape run complete"
    );

    if dry_run {
        for batch in &batches {
            println!("{}: {} offers", batch.provider, batch.offers.len());
        }
        println!("dry run, nothing written");
        return Ok(());
    }

    let db = connect(&config).await?;
    let catalog = OfferCatalogStore::new(db.pool());
    let samples = SampleStore::new(db.pool());

    let inserted = catalog.replace_all(&batches).await?;

    // One day-bucketed price point per offer; re-running the same day
    // overwrites that day's point in place.
    let price_samples: Vec<Sample> = batches
        .iter()
        .flat_map(|batch| {
            batch.offers.iter().filter_map(|offer| {
                let value = offer.row.price_hour_usd?;
                Some(Sample {
                    subject: offer.stable_key.clone(),
                    dimension: "price".to_string(),
                    observed_at: offer.row.observed_at,
                    value,
                    provider: Some(batch.provider.clone()),
                })
            })
        })
        .collect();
    let sampled = samples
        .upsert_samples(&price_samples, Granularity::Day, IngestMode::Append)
        .await?;

    // Cached reads derived from the previous catalog are stale now.
    let queries = cached_queries(&config, catalog);
    let invalidated = queries.invalidate_pricing().await;

    tracing::info!(
        offers = inserted,
        samples = sampled,
        cache_entries_dropped = invalidated,
        "catalog rebuilt"
    );
    println!("catalog rebuilt: {inserted} offers, {sampled} price samples");
    Ok(())
}

pub async fn run_query(config_path: &str, args: QueryArgs) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let db = connect(&config).await?;
    let queries = cached_queries(&config, OfferCatalogStore::new(db.pool()));

    let query = OfferQuery {
        providers: args.providers,
        gpu_model: args.model,
        class: args.class.as_deref().map(parse_class).transpose()?,
        deployment: args
            .deployment
            .as_deref()
            .map(parse_deployment)
            .transpose()?,
        min_gpu_count: args.min_gpu_count,
        min_vram_gb: args.min_vram,
        max_vram_gb: args.max_vram,
        min_price_hour_usd: parse_price(args.min_price.as_deref(), "--min-price")?,
        max_price_hour_usd: parse_price(args.max_price.as_deref(), "--max-price")?,
        search: args.search,
        sort: parse_sort(&args.sort)?,
        page: args.page,
        per_page: args.per_page,
    };

    let result = queries.get_filtered(&query).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub async fn run_facets(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let db = connect(&config).await?;
    let queries = cached_queries(&config, OfferCatalogStore::new(db.pool()));

    let facets = queries.get_facets().await?;
    println!("{}", serde_json::to_string_pretty(&facets)?);
    Ok(())
}

pub async fn run_series(config_path: &str, subject: &str, dimension: Option<&str>) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let db = connect(&config).await?;
    let samples = SampleStore::new(db.pool());

    let series = samples.get_series(subject, dimension).await?;
    println!("{}", serde_json::to_string_pretty(&series)?);
    Ok(())
}

pub async fn run_stats(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let db = connect(&config).await?;
    let catalog = OfferCatalogStore::new(db.pool());

    let stats = catalog.stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

pub async fn run_prune(config_path: &str, days: Option<i64>) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let days = days.unwrap_or(config.retention.days);
    let db = connect(&config).await?;
    let samples = SampleStore::new(db.pool());

    let removed = samples.prune_older_than(days).await?;
    println!("pruned {removed} samples older than {days} days");
    Ok(())
}

/// Normalizes model names, then deduplicates each provider's rows down to
/// the cheapest offer per hardware configuration.
fn build_batches(provider_results: Vec<ProviderResult>) -> Vec<OfferBatch> {
    provider_results
        .into_iter()
        .map(|result| {
            let rows = result
                .rows
                .into_iter()
                .map(|mut row| {
                    row.gpu_model = normalize_gpu_model(&row.gpu_model);
                    row
                })
                .collect();
            OfferBatch {
                provider: result.provider,
                source_hash: result.source_hash,
                offers: dedupe_lowest_price(rows),
            }
        })
        .collect()
}

async fn connect(config: &AppConfig) -> Result<DatabaseClient> {
    DatabaseClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to the database")
}

fn cached_queries(
    config: &AppConfig,
    catalog: OfferCatalogStore,
) -> CachedOfferQueries<OfferCatalogStore, MemoryTagCache> {
    CachedOfferQueries::new(
        catalog,
        MemoryTagCache::new(config.cache.max_entry_bytes),
        Duration::from_secs(config.cache.ttl_secs),
    )
}

fn parse_class(raw: &str) -> Result<OfferingClass> {
    match raw.to_lowercase().as_str() {
        "gpu" => Ok(OfferingClass::Gpu),
        "cpu" => Ok(OfferingClass::Cpu),
        other => Err(anyhow!("unknown class {other:?}, expected gpu or cpu")),
    }
}

fn parse_deployment(raw: &str) -> Result<DeploymentType> {
    match raw.to_lowercase().as_str() {
        "vm" | "virtual-machine" | "virtual machine" => Ok(DeploymentType::VirtualMachine),
        "bare-metal" | "bare metal" | "baremetal" => Ok(DeploymentType::BareMetal),
        "vgpu" => Ok(DeploymentType::Vgpu),
        other => Err(anyhow!(
            "unknown deployment type {other:?}, expected vm, bare-metal, or vgpu"
        )),
    }
}

fn parse_price(raw: Option<&str>, flag: &str) -> Result<Option<Decimal>> {
    raw.map(|value| {
        Decimal::from_str(value).with_context(|| format!("invalid {flag}: {value}"))
    })
    .transpose()
}

fn parse_sort(raw: &str) -> Result<SortOrder> {
    match raw.to_lowercase().as_str() {
        "price-asc" => Ok(SortOrder::PriceAsc),
        "price-desc" => Ok(SortOrder::PriceDesc),
        "provider" => Ok(SortOrder::Provider),
        "model" => Ok(SortOrder::GpuModel),
        other => Err(anyhow!(
            "unknown sort order {other:?}, expected price-asc, price-desc, provider, or model"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_aliases_parse() {
        assert_eq!(parse_deployment("vm").unwrap(), DeploymentType::VirtualMachine);
        assert_eq!(
            parse_deployment("Bare-Metal").unwrap(),
            DeploymentType::BareMetal
        );
        assert_eq!(parse_deployment("vGPU").unwrap(), DeploymentType::Vgpu);
        assert!(parse_deployment("container").is_err());
    }

    #[test]
    fn sort_names_parse() {
        assert_eq!(parse_sort("price-asc").unwrap(), SortOrder::PriceAsc);
        assert_eq!(parse_sort("MODEL").unwrap(), SortOrder::GpuModel);
        assert!(parse_sort("cheapest").is_err());
    }
}
