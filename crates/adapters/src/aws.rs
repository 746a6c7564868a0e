//! AWS EC2 adapter.
//!
//! Reads the bulk price list for us-east-1 instead of scraping HTML. The
//! price list mixes every purchase option, so rows are filtered down to
//! plain on-demand Linux capacity, and each GPU configuration keeps only
//! its cheapest instance type.

use crate::http::fetch_json;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gpuatlas_core::{
    sha256_hex, AdapterResult, DeploymentType, OfferingClass, PriceUnit, ProviderResult,
    ProviderRow, SourceAdapter,
};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

const PRICE_LIST_URL: &str =
    "https://pricing.us-east-1.amazonaws.com/offers/v1.0/aws/AmazonEC2/current/us-east-1/index.json";
const SOURCE_URL: &str = "https://aws.amazon.com/ec2/pricing/on-demand/";

/// GPU instance family to model and per-GPU VRAM. The price list's
/// `gpuMemory` attribute is per GPU for some families and a total for
/// others, so the known-correct spec is kept here.
fn family_spec(family: &str) -> Option<(&'static str, u32)> {
    match family {
        "p6-b200" => Some(("NVIDIA B200", 192)),
        "p6-b300" => Some(("NVIDIA B300", 288)),
        "p5en" | "p5e" => Some(("NVIDIA H200", 141)),
        "p5" => Some(("NVIDIA H100", 80)),
        "p4d" => Some(("NVIDIA A100", 40)),
        "p4de" => Some(("NVIDIA A100", 80)),
        "g6e" => Some(("NVIDIA L40S", 48)),
        "g6" => Some(("NVIDIA L4", 24)),
        "g5" => Some(("NVIDIA A10G", 24)),
        "g4dn" => Some(("NVIDIA Tesla T4", 16)),
        "g4ad" => Some(("AMD Radeon Pro V520", 8)),
        "g5g" => Some(("NVIDIA Tesla T4G", 16)),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct RawPriceList {
    #[serde(default)]
    products: BTreeMap<String, RawProduct>,
    #[serde(default)]
    terms: RawTerms,
}

#[derive(Debug, Deserialize)]
struct RawProduct {
    #[serde(rename = "productFamily", default)]
    product_family: String,
    #[serde(default)]
    attributes: RawAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct RawAttributes {
    #[serde(rename = "instanceType", default)]
    instance_type: String,
    #[serde(default)]
    vcpu: String,
    #[serde(default)]
    memory: String,
    #[serde(default)]
    gpu: String,
    #[serde(rename = "operatingSystem", default)]
    operating_system: String,
    #[serde(default)]
    tenancy: String,
    #[serde(default)]
    capacitystatus: String,
    #[serde(rename = "preInstalledSw", default)]
    pre_installed_sw: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawTerms {
    #[serde(rename = "OnDemand", default)]
    on_demand: BTreeMap<String, BTreeMap<String, RawTerm>>,
}

#[derive(Debug, Deserialize)]
struct RawTerm {
    #[serde(rename = "priceDimensions", default)]
    price_dimensions: BTreeMap<String, RawDimension>,
}

#[derive(Debug, Deserialize)]
struct RawDimension {
    #[serde(default)]
    unit: String,
    #[serde(rename = "pricePerUnit", default)]
    price_per_unit: BTreeMap<String, String>,
}

pub struct AwsAdapter {
    client: Client,
    price_list_url: String,
}

impl AwsAdapter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            price_list_url: PRICE_LIST_URL.to_string(),
        }
    }

    /// Overrides the price list URL, for tests against a local server.
    #[must_use]
    pub fn with_price_list_url(mut self, url: impl Into<String>) -> Self {
        self.price_list_url = url.into();
        self
    }
}

#[async_trait]
impl SourceAdapter for AwsAdapter {
    fn name(&self) -> &'static str {
        "aws"
    }

    fn source_url(&self) -> &str {
        SOURCE_URL
    }

    async fn scrape(&self) -> AdapterResult<ProviderResult> {
        let (price_list, _body_hash): (RawPriceList, String) =
            fetch_json(&self.client, &self.price_list_url).await?;
        let observed_at = Utc::now();

        // The body itself churns on every publish; the product count is a
        // cheap proxy that only moves when the catalog actually changes.
        let source_hash = sha256_hex(price_list.products.len().to_string().as_bytes());
        let rows = parse_products(&price_list, observed_at);

        tracing::debug!(rows = rows.len(), "aws GPU instances priced");

        Ok(ProviderResult {
            provider: self.name().to_string(),
            rows,
            observed_at,
            source_hash,
        })
    }
}

fn parse_products(price_list: &RawPriceList, observed_at: DateTime<Utc>) -> Vec<ProviderRow> {
    // Lowest price per (model, count, vcpus, ram) configuration.
    let mut best_by_config: HashMap<(String, u32, Option<u32>, String), ProviderRow> =
        HashMap::new();

    for (sku, product) in &price_list.products {
        if product.product_family != "Compute Instance" {
            continue;
        }

        let attrs = &product.attributes;
        if attrs.operating_system != "Linux"
            || attrs.tenancy != "Shared"
            || attrs.capacitystatus != "Used"
            || attrs.pre_installed_sw != "NA"
            || attrs.instance_type.is_empty()
        {
            continue;
        }

        let gpu_count: u32 = attrs.gpu.parse().unwrap_or(0);
        if gpu_count == 0 {
            continue;
        }

        let Some(family) = attrs.instance_type.split('.').next() else {
            continue;
        };
        let Some((model, vram_per_gpu)) = family_spec(family) else {
            continue;
        };

        let Some(price) = on_demand_price(&price_list.terms, sku) else {
            continue;
        };

        let vcpus: Option<u32> = attrs.vcpu.parse().ok();
        let system_ram_gb = attrs
            .memory
            .split_whitespace()
            .next()
            .and_then(|n| Decimal::from_str(n).ok());

        let config = (
            model.to_string(),
            gpu_count,
            vcpus,
            system_ram_gb.map(|r| r.to_string()).unwrap_or_default(),
        );

        let candidate = ProviderRow {
            provider: "aws".to_string(),
            instance_id: Some(attrs.instance_type.clone()),
            sku: Some(sku.clone()),
            gpu_model: model.to_string(),
            gpu_count: Some(gpu_count),
            vram_gb: Some(vram_per_gpu * gpu_count),
            vcpus,
            system_ram_gb,
            storage: None,
            price_hour_usd: Some(price),
            price_unit: PriceUnit::InstanceHour,
            class: OfferingClass::Gpu,
            deployment: DeploymentType::VirtualMachine,
            source_url: SOURCE_URL.to_string(),
            observed_at,
        };

        match best_by_config.get(&config) {
            Some(held) if held.price_hour_usd <= candidate.price_hour_usd => {}
            _ => {
                best_by_config.insert(config, candidate);
            }
        }
    }

    let mut rows: Vec<ProviderRow> = best_by_config.into_values().collect();
    rows.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
    rows
}

fn on_demand_price(terms: &RawTerms, sku: &str) -> Option<Decimal> {
    let sku_terms = terms.on_demand.get(sku)?;
    let term = sku_terms.values().next()?;

    // Prefer the hourly dimension, fall back to the first one.
    let dimension = term
        .price_dimensions
        .values()
        .find(|d| d.unit == "Hrs")
        .or_else(|| term.price_dimensions.values().next())?;

    let usd = dimension.price_per_unit.get("USD")?;
    if usd == "0.0000000000" {
        return None;
    }
    let price = Decimal::from_str(usd).ok()?;
    (!price.is_zero()).then_some(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fixture() -> RawPriceList {
        let payload = serde_json::json!({
            "products": {
                "SKU-P5-ONDEMAND": {
                    "productFamily": "Compute Instance",
                    "attributes": {
                        "instanceType": "p5.48xlarge",
                        "vcpu": "192",
                        "memory": "2048 GiB",
                        "gpu": "8",
                        "operatingSystem": "Linux",
                        "tenancy": "Shared",
                        "capacitystatus": "Used",
                        "preInstalledSw": "NA"
                    }
                },
                "SKU-P5-EXPENSIVE": {
                    "productFamily": "Compute Instance",
                    "attributes": {
                        "instanceType": "p5.48xlarge",
                        "vcpu": "192",
                        "memory": "2048 GiB",
                        "gpu": "8",
                        "operatingSystem": "Linux",
                        "tenancy": "Shared",
                        "capacitystatus": "Used",
                        "preInstalledSw": "NA"
                    }
                },
                "SKU-WINDOWS": {
                    "productFamily": "Compute Instance",
                    "attributes": {
                        "instanceType": "p5.48xlarge",
                        "vcpu": "192",
                        "memory": "2048 GiB",
                        "gpu": "8",
                        "operatingSystem": "Windows",
                        "tenancy": "Shared",
                        "capacitystatus": "Used",
                        "preInstalledSw": "NA"
                    }
                },
                "SKU-CPU": {
                    "productFamily": "Compute Instance",
                    "attributes": {
                        "instanceType": "m7i.large",
                        "vcpu": "2",
                        "memory": "8 GiB",
                        "gpu": "0",
                        "operatingSystem": "Linux",
                        "tenancy": "Shared",
                        "capacitystatus": "Used",
                        "preInstalledSw": "NA"
                    }
                }
            },
            "terms": {
                "OnDemand": {
                    "SKU-P5-ONDEMAND": {
                        "SKU-P5-ONDEMAND.TERM": {
                            "priceDimensions": {
                                "SKU-P5-ONDEMAND.TERM.DIM": {
                                    "unit": "Hrs",
                                    "pricePerUnit": { "USD": "55.04" }
                                }
                            }
                        }
                    },
                    "SKU-P5-EXPENSIVE": {
                        "SKU-P5-EXPENSIVE.TERM": {
                            "priceDimensions": {
                                "SKU-P5-EXPENSIVE.TERM.DIM": {
                                    "unit": "Hrs",
                                    "pricePerUnit": { "USD": "98.32" }
                                }
                            }
                        }
                    },
                    "SKU-WINDOWS": {
                        "SKU-WINDOWS.TERM": {
                            "priceDimensions": {
                                "SKU-WINDOWS.TERM.DIM": {
                                    "unit": "Hrs",
                                    "pricePerUnit": { "USD": "70.00" }
                                }
                            }
                        }
                    },
                    "SKU-CPU": {
                        "SKU-CPU.TERM": {
                            "priceDimensions": {
                                "SKU-CPU.TERM.DIM": {
                                    "unit": "Hrs",
                                    "pricePerUnit": { "USD": "0.10" }
                                }
                            }
                        }
                    }
                }
            }
        });
        serde_json::from_value(payload).unwrap()
    }

    #[test]
    fn keeps_lowest_priced_instance_per_configuration() {
        let rows = parse_products(&fixture(), Utc::now());
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.instance_id.as_deref(), Some("p5.48xlarge"));
        assert_eq!(row.sku.as_deref(), Some("SKU-P5-ONDEMAND"));
        assert_eq!(row.gpu_model, "NVIDIA H100");
        assert_eq!(row.gpu_count, Some(8));
        assert_eq!(row.vram_gb, Some(640));
        assert_eq!(row.vcpus, Some(192));
        assert_eq!(row.system_ram_gb, Some(dec!(2048)));
        assert_eq!(row.price_hour_usd, Some(dec!(55.04)));
    }

    #[test]
    fn zero_priced_skus_are_dropped() {
        let terms: RawTerms = serde_json::from_value(serde_json::json!({
            "OnDemand": {
                "SKU": {
                    "SKU.TERM": {
                        "priceDimensions": {
                            "SKU.TERM.DIM": {
                                "unit": "Hrs",
                                "pricePerUnit": { "USD": "0.0000000000" }
                            }
                        }
                    }
                }
            }
        }))
        .unwrap();
        assert_eq!(on_demand_price(&terms, "SKU"), None);
        assert_eq!(on_demand_price(&terms, "MISSING"), None);
    }

    #[test]
    fn unknown_families_are_ignored() {
        assert!(family_spec("m7i").is_none());
        assert_eq!(family_spec("p5"), Some(("NVIDIA H100", 80)));
        assert_eq!(family_spec("g4dn"), Some(("NVIDIA Tesla T4", 16)));
    }
}
