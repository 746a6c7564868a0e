//! Hot Aisle pricing adapter.
//!
//! The page quotes a single per-GPU rate for MI300X capacity. Instance
//! shapes are fixed and known, so the configurations are kept here and
//! only the rate is scraped: the page displays CPU ranges ("8 or 13 CPU
//! Cores") that do not parse reliably.

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
use scraper::Html;
use std::str::FromStr;

const PRICING_URL: &str = "https://hotaisle.xyz/pricing/";

/// VRAM per MI300X GPU.
const MI300X_VRAM_GB: u32 = 192;

struct GpuConfig {
    gpu_count: u32,
    vcpus: u32,
    ram_gb: u32,
    storage: &'static str,
    deployment: DeploymentType,
}

const GPU_CONFIGS: [GpuConfig; 4] = [
    GpuConfig {
        gpu_count: 1,
        vcpus: 13,
        ram_gb: 224,
        storage: "12TB NVMe",
        deployment: DeploymentType::VirtualMachine,
    },
    GpuConfig {
        gpu_count: 2,
        vcpus: 26,
        ram_gb: 448,
        storage: "12TB NVMe",
        deployment: DeploymentType::VirtualMachine,
    },
    GpuConfig {
        gpu_count: 4,
        vcpus: 52,
        ram_gb: 896,
        storage: "12TB NVMe",
        deployment: DeploymentType::VirtualMachine,
    },
    GpuConfig {
        gpu_count: 8,
        vcpus: 102,
        ram_gb: 2048,
        storage: "122TB NVMe",
        deployment: DeploymentType::BareMetal,
    },
];

pub struct HotAisleAdapter {
    client: Client,
    url: String,
}

impl HotAisleAdapter {
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
impl SourceAdapter for HotAisleAdapter {
    fn name(&self) -> &'static str {
        "hotaisle"
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
    let document = Html::parse_document(html);
    let page_text = clean_whitespace(&document.root_element().text().collect::<String>());

    // Sanity check before trusting the scraped rate.
    let mi300 = compile(r"(?i)MI300")?;
    if !mi300.is_match(&page_text) {
        tracing::warn!("Hot Aisle page does not mention MI300, layout may have changed");
        return Ok(Vec::new());
    }

    let rate_pattern = compile(r"(?i)\$(\d+\.?\d*)\s*/\s*GPU\s*/\s*hr")?;
    let per_gpu_rate = rate_pattern
        .captures(&page_text)
        .and_then(|c| c.get(1))
        .and_then(|m| Decimal::from_str(m.as_str()).ok())
        .filter(|rate| !rate.is_zero());

    let Some(per_gpu_rate) = per_gpu_rate else {
        tracing::warn!("no per-GPU rate found on Hot Aisle page");
        return Ok(Vec::new());
    };

    tracing::debug!(%per_gpu_rate, "hot aisle per-GPU rate");

    let rows = GPU_CONFIGS
        .iter()
        .map(|config| {
            let price = (per_gpu_rate * Decimal::from(config.gpu_count)).round_dp(2);
            let suffix = match config.deployment {
                DeploymentType::BareMetal => "-baremetal",
                _ => "",
            };

            ProviderRow {
                provider: "hotaisle".to_string(),
                instance_id: Some(format!("hotaisle-mi300x-{}x{suffix}", config.gpu_count)),
                sku: None,
                gpu_model: "AMD MI300X".to_string(),
                gpu_count: Some(config.gpu_count),
                vram_gb: Some(MI300X_VRAM_GB * config.gpu_count),
                vcpus: Some(config.vcpus),
                system_ram_gb: Some(Decimal::from(config.ram_gb)),
                storage: Some(config.storage.to_string()),
                price_hour_usd: Some(price),
                price_unit: PriceUnit::InstanceHour,
                class: OfferingClass::Gpu,
                deployment: config.deployment,
                source_url: source_url.to_string(),
                observed_at,
            }
        })
        .collect();

    Ok(rows)
}
