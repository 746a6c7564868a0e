//! Vultr pricing adapter.
//!
//! Two sections of the pricing page carry GPU offers with different
//! markup. The Cloud GPU section is a div-based grid (`.pt__row` /
//! `.pt__cell`) priced per GPU; the Bare Metal section is plan cards
//! (`.package`) mixing GPU and CPU hardware, also priced per GPU. Both are
//! converted to instance totals, and duplicate sections on the page are
//! collapsed by instance id.

use crate::http::{fetch_page, FetchedBody};
use crate::parse::{clean_whitespace, compile, first_dollar_amount, first_uint, selector};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gpuatlas_core::{
    AdapterResult, DeploymentType, OfferingClass, PriceUnit, ProviderResult, ProviderRow,
    SourceAdapter,
};
use reqwest::Client;
use rust_decimal::Decimal;
use scraper::Html;
use std::collections::HashSet;
use std::str::FromStr;

const PRICING_URL: &str = "https://www.vultr.com/pricing/";

pub struct VultrAdapter {
    client: Client,
    url: String,
}

impl VultrAdapter {
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
impl SourceAdapter for VultrAdapter {
    fn name(&self) -> &'static str {
        "vultr"
    }

    fn source_url(&self) -> &str {
        &self.url
    }

    async fn scrape(&self) -> AdapterResult<ProviderResult> {
        let FetchedBody { body, sha256 } = fetch_page(&self.client, &self.url).await?;
        let observed_at = Utc::now();

        let document = Html::parse_document(&body);
        let mut rows = parse_cloud_gpu_section(&document, &self.url, observed_at)?;
        let bare_metal = parse_bare_metal_section(&document, &self.url, observed_at)?;
        let cloud_count = rows.len();
        rows.extend(bare_metal);

        // The page repeats some plans across sections.
        let mut seen = HashSet::new();
        rows.retain(|row| {
            let key = row.instance_id.clone().unwrap_or_else(|| {
                format!("{}-{:?}-{:?}", row.gpu_model, row.gpu_count, row.vram_gb)
            });
            seen.insert(key)
        });

        tracing::debug!(
            total = rows.len(),
            cloud_gpu = cloud_count,
            "vultr rows parsed"
        );

        Ok(ProviderResult {
            provider: self.name().to_string(),
            rows,
            observed_at,
            source_hash: sha256,
        })
    }
}

/// Cloud GPU grid: GPU Count | GPU RAM | vCPUs | RAM | Storage | Bandwidth | Price.
fn parse_cloud_gpu_section(
    document: &Html,
    source_url: &str,
    observed_at: DateTime<Utc>,
) -> AdapterResult<Vec<ProviderRow>> {
    let section_sel = selector("#cloud-gpu")?;
    let subsection_sel = selector(".pricing__subsection")?;
    let title_sel = selector("h3")?;
    let row_sel = selector(".pt__row")?;
    let content_sel = selector(".pt__row-content")?;
    let cell_sel = selector(".pt__cell")?;
    let pricing_suffix = compile(r"(?i)\s*Pricing$")?;

    let mut rows = Vec::new();
    let Some(section) = document.select(&section_sel).next() else {
        tracing::warn!("no #cloud-gpu section on Vultr page, layout may have changed");
        return Ok(rows);
    };

    for subsection in section.select(&subsection_sel) {
        let Some(title) = subsection.select(&title_sel).next() else {
            continue;
        };
        let gpu_model = clean_whitespace(
            &pricing_suffix.replace(&title.text().collect::<String>(), ""),
        );
        if gpu_model.is_empty() {
            continue;
        }

        for row in subsection.select(&row_sel) {
            // Header rows carry no .pt__row-content.
            let Some(content) = row.select(&content_sel).next() else {
                continue;
            };
            let cells: Vec<String> = content
                .select(&cell_sel)
                .map(|cell| clean_whitespace(&cell.text().collect::<String>()))
                .collect();
            if cells.len() < 7 {
                continue;
            }

            // Fractional counts like "1/8" are GPU slices, not instances.
            if cells[0].contains('/') {
                continue;
            }

            let gpu_count = first_uint(&cells[0]).unwrap_or(1).max(1);
            let Some(vram_gb) = first_uint(&cells[1]).filter(|v| *v > 0) else {
                continue;
            };
            let vcpus = first_uint(&cells[2]).filter(|v| *v > 0);
            let system_ram_gb = first_uint(&cells[3]).map(Decimal::from);
            let storage = cells[4].clone();
            let price_text = &cells[6];

            let price_hour_usd =
                parse_per_gpu_price(price_text, gpu_count, price_text.to_lowercase().contains("/gpu"));

            let instance_id = format!(
                "cloud-gpu-{}-{gpu_count}x",
                gpu_model.to_lowercase().replace(' ', "-")
            );

            rows.push(ProviderRow {
                provider: "vultr".to_string(),
                instance_id: Some(instance_id),
                sku: None,
                gpu_model: gpu_model.clone(),
                gpu_count: Some(gpu_count),
                vram_gb: Some(vram_gb),
                vcpus,
                system_ram_gb,
                storage: (!storage.is_empty()).then_some(storage),
                price_hour_usd,
                price_unit: PriceUnit::InstanceHour,
                class: OfferingClass::Gpu,
                deployment: DeploymentType::VirtualMachine,
                source_url: source_url.to_string(),
                observed_at,
            });
        }
    }

    Ok(rows)
}

/// Bare Metal plan cards. GPU cards are told apart from CPU cards by their
/// first spec line, which reads like "8 x NVIDIA B200 192 GB".
fn parse_bare_metal_section(
    document: &Html,
    source_url: &str,
    observed_at: DateTime<Utc>,
) -> AdapterResult<Vec<ProviderRow>> {
    let section_sel = selector("#bare-metal")?;
    let package_sel = selector(".package")?;
    let title_sel = selector(".package__title")?;
    let item_sel = selector(".package__list-item")?;
    let price_sel = selector(".package__price")?;

    let gpu_first_spec = compile(r"(?i)\d+\s*x\s*(?:NVIDIA|AMD)\s+[\w\s]+\d+\s*GB")?;
    let gpu_spec = compile(r"(?i)(\d+)\s*x\s*(?:NVIDIA|AMD)\s*[\w\s]+?\s*(\d+)\s*GB")?;
    let count_only = compile(r"(?i)(\d+)\s*x")?;
    let vram_only = compile(r"(?i)(\d+)\s*GB")?;
    let cpu_spec = compile(r"(?i)(\d+)\s*(?:Cores?|vCPUs?|Threads?)")?;
    let ram_spec = compile(r"(?i)(\d+(?:\.\d+)?)\s*(TB|GB)\s*RAM")?;
    let storage_spec = compile(r"(?i)(\d+(?:\.\d+)?)\s*TB\s*(?:NVMe|SSD|storage)")?;

    let mut rows = Vec::new();
    let Some(section) = document.select(&section_sel).next() else {
        tracing::warn!("no #bare-metal section on Vultr page, layout may have changed");
        return Ok(rows);
    };

    for package in section.select(&package_sel) {
        let title = package
            .select(&title_sel)
            .next()
            .map(|el| clean_whitespace(&el.text().collect::<String>()))
            .unwrap_or_default();

        let specs: Vec<String> = package
            .select(&item_sel)
            .map(|item| clean_whitespace(&item.text().collect::<String>()))
            .collect();
        let first_spec = specs.first().map(String::as_str).unwrap_or_default();
        if !gpu_first_spec.is_match(first_spec) {
            continue;
        }
        let specs_text = specs.join(" ");

        let (gpu_count, vram_gb) = match gpu_spec.captures(&specs_text) {
            Some(captures) => (
                uint_capture(&captures, 1).unwrap_or(1),
                uint_capture(&captures, 2).unwrap_or(0),
            ),
            None => (
                count_only
                    .captures(&specs_text)
                    .and_then(|c| uint_capture(&c, 1))
                    .unwrap_or(1),
                vram_only
                    .captures(&specs_text)
                    .and_then(|c| uint_capture(&c, 1))
                    .unwrap_or(0),
            ),
        };
        if vram_gb == 0 && gpu_count == 0 {
            continue;
        }

        let vcpus = cpu_spec
            .captures(&specs_text)
            .and_then(|c| uint_capture(&c, 1))
            .filter(|v| *v > 0);

        let system_ram_gb = ram_spec.captures(&specs_text).and_then(|captures| {
            let amount = Decimal::from_str(captures.get(1)?.as_str()).ok()?;
            let unit = captures.get(2)?.as_str();
            if unit.eq_ignore_ascii_case("TB") {
                Some((amount * Decimal::from(1024)).round())
            } else {
                Some(amount)
            }
        });

        let storage = storage_spec
            .captures(&specs_text)
            .and_then(|c| c.get(1).map(|m| format!("{} TB NVMe", m.as_str())));

        let price_text = package
            .select(&price_sel)
            .next()
            .map(|el| clean_whitespace(&el.text().collect::<String>()))
            .unwrap_or_default();
        let price_hour_usd = parse_per_gpu_price(&price_text, gpu_count, true);

        let instance_id = format!(
            "bare-metal-{}-{gpu_count}x",
            title.to_lowercase().replace(' ', "-")
        );

        rows.push(ProviderRow {
            provider: "vultr".to_string(),
            instance_id: Some(instance_id),
            sku: None,
            gpu_model: title,
            gpu_count: Some(gpu_count),
            vram_gb: (vram_gb > 0).then_some(vram_gb),
            vcpus,
            system_ram_gb,
            storage,
            price_hour_usd,
            price_unit: PriceUnit::InstanceHour,
            class: OfferingClass::Gpu,
            deployment: DeploymentType::BareMetal,
            source_url: source_url.to_string(),
            observed_at,
        });
    }

    Ok(rows)
}

/// Converts a quoted price to an instance total. "Contact sales" and empty
/// text map to `None`.
fn parse_per_gpu_price(text: &str, gpu_count: u32, per_gpu: bool) -> Option<Decimal> {
    if text.is_empty() || text.to_lowercase().contains("contact") {
        return None;
    }
    let quoted = first_dollar_amount(text)?;
    let total = if per_gpu {
        quoted * Decimal::from(gpu_count)
    } else {
        quoted
    };
    Some(total.round_dp(2))
}

fn uint_capture(captures: &regex::Captures<'_>, index: usize) -> Option<u32> {
    captures.get(index)?.as_str().parse().ok()
}
