//! DigitalOcean GPU droplet adapter.
//!
//! The pricing page is a Next.js app; plan data rides in the
//! `__NEXT_DATA__` script tag as JSON, so no table scraping is needed.

use crate::http::{fetch_page, FetchedBody};
use crate::parse::{clean_whitespace, compile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gpuatlas_core::{
    AdapterResult, DeploymentType, OfferingClass, PriceUnit, ProviderResult, ProviderRow,
    SourceAdapter,
};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

const PRICING_URL: &str = "https://www.digitalocean.com/pricing/gpu-droplets";

#[derive(Debug, Deserialize)]
struct RawNextData {
    props: RawProps,
}

#[derive(Debug, Deserialize)]
struct RawProps {
    #[serde(rename = "pageProps")]
    page_props: RawPageProps,
}

#[derive(Debug, Deserialize)]
struct RawPageProps {
    data: RawPageData,
}

#[derive(Debug, Deserialize)]
struct RawPageData {
    #[serde(default)]
    plans: Vec<RawGpuPlan>,
}

/// One GPU droplet plan as embedded in the page payload.
#[derive(Debug, Deserialize)]
struct RawGpuPlan {
    /// e.g. "NVIDIA HGX H100×8" or "AMD Instinct™ MI300X".
    #[serde(default)]
    description: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    cpus: Option<u32>,
    /// System RAM in GB.
    #[serde(default)]
    memory: Option<Decimal>,
    #[serde(default)]
    disk: Option<RawDisk>,
    price: Option<RawPrice>,
    gpu: Option<RawGpu>,
}

#[derive(Debug, Deserialize)]
struct RawDisk {
    #[serde(default)]
    boot: Option<u32>,
    #[serde(default)]
    scratch: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawPrice {
    hourly: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct RawGpu {
    /// Total VRAM in GB.
    memory: Option<u32>,
    /// GPU count; absent means a single GPU.
    variant: Option<u32>,
}

pub struct DigitalOceanAdapter {
    client: Client,
    url: String,
}

impl DigitalOceanAdapter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            url: PRICING_URL.to_string(),
        }
    }

    /// Overrides the pricing URL, for tests against a local server.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl SourceAdapter for DigitalOceanAdapter {
    fn name(&self) -> &'static str {
        "digitalocean"
    }

    fn source_url(&self) -> &str {
        &self.url
    }

    async fn scrape(&self) -> AdapterResult<ProviderResult> {
        let FetchedBody { body, sha256 } = fetch_page(&self.client, &self.url).await?;
        let observed_at = Utc::now();
        let rows = parse_pricing_page(&body, &self.url, observed_at)?;

        Ok(ProviderResult {
            provider: self.name().to_string(),
            rows,
            observed_at,
            source_hash: sha256,
        })
    }
}

fn parse_pricing_page(
    html: &str,
    source_url: &str,
    observed_at: DateTime<Utc>,
) -> AdapterResult<Vec<ProviderRow>> {
    let script = compile(r#"<script id="__NEXT_DATA__"[^>]*>([^<]+)</script>"#)?;
    let Some(payload) = script.captures(html).and_then(|c| c.get(1)) else {
        tracing::warn!("no __NEXT_DATA__ payload on DigitalOcean page");
        return Ok(Vec::new());
    };

    let next_data: RawNextData = match serde_json::from_str(payload.as_str()) {
        Ok(data) => data,
        Err(err) => {
            tracing::warn!(%err, "undecodable __NEXT_DATA__ payload");
            return Ok(Vec::new());
        }
    };

    let mut rows = Vec::new();
    for plan in next_data.props.page_props.data.plans {
        let Some(hourly) = plan.price.as_ref().and_then(|p| p.hourly) else {
            continue;
        };
        let Some(vram_gb) = plan.gpu.as_ref().and_then(|g| g.memory).filter(|v| *v > 0) else {
            continue;
        };
        if plan.description.is_empty() {
            continue;
        }

        let gpu_model = clean_model_name(&plan.description)?;
        let gpu_count = plan
            .gpu
            .as_ref()
            .and_then(|g| g.variant)
            .filter(|v| *v > 0)
            .unwrap_or(1);

        rows.push(ProviderRow {
            provider: "digitalocean".to_string(),
            instance_id: (!plan.slug.is_empty()).then(|| plan.slug.clone()),
            sku: None,
            gpu_model,
            gpu_count: Some(gpu_count),
            vram_gb: Some(vram_gb),
            vcpus: plan.cpus.filter(|v| *v > 0),
            system_ram_gb: plan.memory,
            storage: describe_storage(plan.disk.as_ref()),
            price_hour_usd: Some(hourly),
            price_unit: if gpu_count == 1 {
                PriceUnit::GpuHour
            } else {
                PriceUnit::InstanceHour
            },
            class: OfferingClass::Gpu,
            deployment: DeploymentType::VirtualMachine,
            source_url: source_url.to_string(),
            observed_at,
        });
    }

    Ok(rows)
}

/// "NVIDIA HGX H100×8" becomes "NVIDIA H100", "AMD Instinct™ MI300X"
/// becomes "AMD MI300X".
fn clean_model_name(description: &str) -> AdapterResult<String> {
    let count_suffix = compile(r"×\d+$")?;
    let instinct = compile(r"(?i)Instinct\s+")?;
    let hgx = compile(r"(?i)\bHGX\s*")?;
    let ada_generation = compile(r"(?i)\s+Ada\s+Generation\b")?;

    let mut name = count_suffix.replace(description, "").to_string();
    name = name.replace('\u{2122}', "");
    name = instinct.replace(&name, "").to_string();
    name = hgx.replace_all(&name, "").to_string();
    name = ada_generation.replace_all(&name, " Ada").to_string();
    Ok(clean_whitespace(&name))
}

fn describe_storage(disk: Option<&RawDisk>) -> Option<String> {
    let disk = disk?;
    let mut parts = Vec::new();
    if let Some(boot) = disk.boot.filter(|b| *b > 0) {
        parts.push(format!("Boot: {}", format_disk_size(boot)));
    }
    if let Some(scratch) = disk.scratch.filter(|s| *s > 0) {
        parts.push(format!("Scratch: {}", format_disk_size(scratch)));
    }
    (!parts.is_empty()).then(|| parts.join(", "))
}

fn format_disk_size(gb: u32) -> String {
    if gb >= 1000 {
        format!("{:.1} TB", f64::from(gb) / 1000.0)
    } else {
        format!("{gb} GB")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fixture() -> String {
        let payload = serde_json::json!({
            "props": {
                "pageProps": {
                    "data": {
                        "plans": [
                            {
                                "description": "NVIDIA HGX H100×8",
                                "slug": "gpu-h100x8-640gb",
                                "cpus": 160,
                                "memory": 1920,
                                "disk": { "boot": 2046, "scratch": 40960 },
                                "price": { "hourly": 23.92 },
                                "gpu": { "memory": 640, "variant": 8 }
                            },
                            {
                                "description": "AMD Instinct™ MI300X",
                                "slug": "gpu-mi300x-192gb",
                                "cpus": 20,
                                "memory": 240,
                                "disk": { "boot": 720 },
                                "price": { "hourly": 1.99 },
                                "gpu": { "memory": 192 }
                            },
                            {
                                "description": "No price plan",
                                "slug": "broken",
                                "gpu": { "memory": 24 }
                            }
                        ]
                    }
                }
            }
        });
        format!(r#"<html><script id="__NEXT_DATA__" type="application/json">{payload}</script></html>"#)
    }

    #[test]
    fn plans_are_parsed_from_embedded_json() {
        let rows = parse_pricing_page(&fixture(), PRICING_URL, Utc::now()).unwrap();
        assert_eq!(rows.len(), 2);

        let h100 = &rows[0];
        assert_eq!(h100.gpu_model, "NVIDIA H100");
        assert_eq!(h100.gpu_count, Some(8));
        assert_eq!(h100.vram_gb, Some(640));
        assert_eq!(h100.price_hour_usd, Some(dec!(23.92)));
        assert_eq!(h100.price_unit, PriceUnit::InstanceHour);
        assert_eq!(
            h100.storage.as_deref(),
            Some("Boot: 2.0 TB, Scratch: 41.0 TB")
        );

        let mi300x = &rows[1];
        assert_eq!(mi300x.gpu_model, "AMD MI300X");
        assert_eq!(mi300x.gpu_count, Some(1));
        assert_eq!(mi300x.price_unit, PriceUnit::GpuHour);
        assert_eq!(mi300x.storage.as_deref(), Some("Boot: 720 GB"));
    }

    #[test]
    fn model_cleanup_strips_marketing_noise() {
        assert_eq!(clean_model_name("NVIDIA HGX H100×8").unwrap(), "NVIDIA H100");
        assert_eq!(clean_model_name("AMD Instinct™ MI300X").unwrap(), "AMD MI300X");
        assert_eq!(
            clean_model_name("NVIDIA RTX 4000 Ada Generation").unwrap(),
            "NVIDIA RTX 4000 Ada"
        );
    }

    #[test]
    fn page_without_payload_yields_no_rows() {
        let rows = parse_pricing_page("<html></html>", PRICING_URL, Utc::now()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn undecodable_payload_yields_no_rows() {
        let html = r#"<script id="__NEXT_DATA__">{broken json</script>"#;
        let rows = parse_pricing_page(html, PRICING_URL, Utc::now()).unwrap();
        assert!(rows.is_empty());
    }
}
