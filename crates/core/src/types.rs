//! Domain types shared across the scraping, deduplication, and storage layers.
//!
//! `ProviderRow` is the transient normalized record an adapter emits for one
//! offer; it lives only for the duration of a scrape run. `CanonicalOffer` is
//! the single retained offer per configuration after deduplication and is
//! what the catalog persists.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Broad hardware class of an offering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfferingClass {
    #[serde(rename = "GPU")]
    Gpu,
    #[serde(rename = "CPU")]
    Cpu,
}

impl OfferingClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gpu => "GPU",
            Self::Cpu => "CPU",
        }
    }
}

/// How the hardware is delivered to the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentType {
    #[serde(rename = "Virtual Machine")]
    VirtualMachine,
    #[serde(rename = "Bare Metal")]
    BareMetal,
    #[serde(rename = "vGPU")]
    Vgpu,
}

impl DeploymentType {
    /// Display form used in provider-facing output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VirtualMachine => "Virtual Machine",
            Self::BareMetal => "Bare Metal",
            Self::Vgpu => "vGPU",
        }
    }

    /// Lowercase form used inside stable identity keys.
    #[must_use]
    pub fn key_segment(self) -> &'static str {
        match self {
            Self::VirtualMachine => "virtual machine",
            Self::BareMetal => "bare metal",
            Self::Vgpu => "vgpu",
        }
    }
}

/// Billing unit the scraped price was quoted in.
///
/// Adapters convert per-GPU quotes to instance totals before emitting rows,
/// so `InstanceHour` is the norm; the original quote unit is retained for
/// display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceUnit {
    #[serde(rename = "instance_hour")]
    InstanceHour,
    #[serde(rename = "gpu_hour")]
    GpuHour,
}

impl PriceUnit {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InstanceHour => "instance_hour",
            Self::GpuHour => "gpu_hour",
        }
    }
}

/// One normalized offer scraped from a provider source.
///
/// Transient: created and discarded within a single scrape invocation.
/// A `None` price means "unavailable / contact sales"; adapters must never
/// encode that as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRow {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    /// Raw model string as the source printed it, e.g. "NVIDIA H100 SXM5".
    pub gpu_model: String,
    /// Number of physical units (GPUs) in the instance, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_count: Option<u32>,
    /// Total VRAM across all units, in GB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vram_gb: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcpus: Option<u32>,
    /// Total system RAM in GB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_ram_gb: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
    /// Hourly USD price for the whole instance. Absent = contact sales.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_hour_usd: Option<Decimal>,
    pub price_unit: PriceUnit,
    pub class: OfferingClass,
    #[serde(rename = "type")]
    pub deployment: DeploymentType,
    pub source_url: String,
    pub observed_at: DateTime<Utc>,
}

/// Everything one adapter produced in one scrape invocation.
#[derive(Debug, Clone)]
pub struct ProviderResult {
    pub provider: String,
    pub rows: Vec<ProviderRow>,
    pub observed_at: DateTime<Utc>,
    /// SHA-256 of the raw fetched content, used for change detection.
    pub source_hash: String,
}

/// The single retained offer for one (provider, configuration) key.
///
/// `audit_hash` changes every run (it covers the full payload plus the
/// observation timestamp); `stable_key` does not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalOffer {
    pub stable_key: String,
    pub audit_hash: String,
    pub row: ProviderRow,
}

/// Per-adapter outcome of one orchestrated run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRunSummary {
    pub provider: String,
    pub rows_scraped: usize,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_row() -> ProviderRow {
        ProviderRow {
            provider: "lambda".to_string(),
            instance_id: Some("8x-nvidia-h100-sxm".to_string()),
            sku: None,
            gpu_model: "NVIDIA H100 SXM".to_string(),
            gpu_count: Some(8),
            vram_gb: Some(640),
            vcpus: Some(208),
            system_ram_gb: Some(dec!(1800)),
            storage: Some("24 TB NVMe".to_string()),
            price_hour_usd: Some(dec!(23.92)),
            price_unit: PriceUnit::InstanceHour,
            class: OfferingClass::Gpu,
            deployment: DeploymentType::VirtualMachine,
            source_url: "https://lambda.ai/pricing".to_string(),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn deployment_type_serializes_display_form() {
        let json = serde_json::to_string(&DeploymentType::BareMetal).unwrap();
        assert_eq!(json, "\"Bare Metal\"");
        let back: DeploymentType = serde_json::from_str("\"vGPU\"").unwrap();
        assert_eq!(back, DeploymentType::Vgpu);
    }

    #[test]
    fn provider_row_round_trips_through_json() {
        let row = sample_row();
        let json = serde_json::to_string(&row).unwrap();
        let back: ProviderRow = serde_json::from_str(&json).unwrap();
        assert_eq!(row, back);
    }

    #[test]
    fn absent_price_is_omitted_from_payload() {
        let mut row = sample_row();
        row.price_hour_usd = None;
        let json = serde_json::to_string(&row).unwrap();
        assert!(!json.contains("price_hour_usd"));
        assert!(!json.contains("0.0"));
    }

    #[test]
    fn deployment_field_serializes_as_type() {
        let json = serde_json::to_string(&sample_row()).unwrap();
        assert!(json.contains("\"type\":\"Virtual Machine\""));
    }
}
