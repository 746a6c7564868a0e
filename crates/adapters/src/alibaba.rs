//! Alibaba Cloud ECS adapter.
//!
//! Unlike the HTML adapters this one drives the signed ECS query API in
//! three steps: enumerate GPU instance types, keep the ones actually in
//! stock in the region, then price each survivor. Probes run in small
//! batches with pauses in between to stay under the API rate limits.
//!
//! Requires `ALIBABA_ID` and `ALIBABA_SECRET`; without them the adapter
//! reports itself disabled and the orchestrator skips it.

use crate::http::from_reqwest;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use gpuatlas_core::{
    sha256_hex, AdapterError, AdapterResult, DeploymentType, OfferingClass, PriceUnit,
    ProviderResult, ProviderRow, SourceAdapter,
};
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha1::Sha1;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

const REGION_ID: &str = "us-east-1";
const SOURCE_URL: &str = "https://www.alibabacloud.com/product/ecs";
const API_VERSION: &str = "2014-05-26";

const AVAILABILITY_BATCH: usize = 10;
const PRICE_BATCH: usize = 5;
const PAGE_DELAY: Duration = Duration::from_millis(200);
const BATCH_DELAY: Duration = Duration::from_millis(500);

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Clone, Deserialize)]
struct RawInstanceType {
    #[serde(rename = "InstanceTypeId", default)]
    instance_type_id: String,
    #[serde(rename = "InstanceTypeFamily", default)]
    instance_type_family: String,
    #[serde(rename = "CpuCoreCount", default)]
    cpu_core_count: u32,
    #[serde(rename = "MemorySize", default)]
    memory_size: Option<Decimal>,
    #[serde(rename = "GPUAmount", default)]
    gpu_amount: u32,
    #[serde(rename = "GPUSpec", default)]
    gpu_spec: String,
    #[serde(rename = "GPUMemorySize", default)]
    gpu_memory_size: f64,
}

#[derive(Debug, Deserialize)]
struct RawInstanceTypesResponse {
    #[serde(rename = "InstanceTypes", default)]
    instance_types: RawInstanceTypeList,
    #[serde(rename = "NextToken", default)]
    next_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawInstanceTypeList {
    #[serde(rename = "InstanceType", default)]
    instance_type: Vec<RawInstanceType>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAvailableResourceResponse {
    #[serde(rename = "AvailableZones", default)]
    available_zones: Option<RawZoneList>,
}

#[derive(Debug, Default, Deserialize)]
struct RawZoneList {
    #[serde(rename = "AvailableZone", default)]
    available_zone: Vec<RawZone>,
}

#[derive(Debug, Deserialize)]
struct RawZone {
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "StatusCategory", default)]
    status_category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPriceResponse {
    #[serde(rename = "PriceInfo", default)]
    price_info: Option<RawPriceInfo>,
}

#[derive(Debug, Deserialize)]
struct RawPriceInfo {
    #[serde(rename = "Price")]
    price: RawPrice,
}

#[derive(Debug, Deserialize)]
struct RawPrice {
    #[serde(rename = "TradePrice")]
    trade_price: Decimal,
}

pub struct AlibabaAdapter {
    client: Client,
    endpoint: String,
    access_key_id: Option<String>,
    access_key_secret: Option<String>,
}

impl AlibabaAdapter {
    /// Builds the adapter, reading API credentials from `ALIBABA_ID` and
    /// `ALIBABA_SECRET`.
    #[must_use]
    pub fn from_env(client: Client) -> Self {
        Self {
            client,
            endpoint: format!("https://ecs.{REGION_ID}.aliyuncs.com/"),
            access_key_id: std::env::var("ALIBABA_ID").ok().filter(|v| !v.is_empty()),
            access_key_secret: std::env::var("ALIBABA_SECRET")
                .ok()
                .filter(|v| !v.is_empty()),
        }
    }

    /// Builds the adapter with explicit credentials and endpoint, for tests.
    #[must_use]
    pub fn with_credentials(
        client: Client,
        endpoint: impl Into<String>,
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            access_key_id: Some(access_key_id.into()),
            access_key_secret: Some(access_key_secret.into()),
        }
    }

    fn credentials(&self) -> AdapterResult<(&str, &str)> {
        match (&self.access_key_id, &self.access_key_secret) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => Err(AdapterError::fetch(
                "ALIBABA_ID and ALIBABA_SECRET are not configured",
            )),
        }
    }

    async fn call_api<T: serde::de::DeserializeOwned>(
        &self,
        action_params: &[(&str, &str)],
    ) -> AdapterResult<T> {
        let (key_id, secret) = self.credentials()?;

        let nonce = Uuid::new_v4().to_string();
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let mut params: Vec<(String, String)> = vec![
            ("Format".to_string(), "JSON".to_string()),
            ("Version".to_string(), API_VERSION.to_string()),
            ("AccessKeyId".to_string(), key_id.to_string()),
            ("SignatureMethod".to_string(), "HMAC-SHA1".to_string()),
            ("Timestamp".to_string(), timestamp),
            ("SignatureVersion".to_string(), "1.0".to_string()),
            ("SignatureNonce".to_string(), nonce),
        ];
        for (key, value) in action_params {
            params.push(((*key).to_string(), (*value).to_string()));
        }

        let signature = sign_request(&params, secret)?;
        params.push(("Signature".to_string(), signature));

        let query: String = params
            .iter()
            .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let response = self
            .client
            .get(format!("{}?{query}", self.endpoint))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::status(
                status.as_u16(),
                "ECS API call failed".to_string(),
            ));
        }

        response.json().await.map_err(from_reqwest)
    }

    /// Enumerates GPU-bearing instance types, following pagination and
    /// dropping vGPU slices like "NVIDIA A10*1/6".
    async fn gpu_instance_types(&self) -> AdapterResult<Vec<RawInstanceType>> {
        let mut all = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut params: Vec<(&str, &str)> = vec![
                ("Action", "DescribeInstanceTypes"),
                ("RegionId", REGION_ID),
                ("MinimumGPUAmount", "1"),
                ("MaxResults", "100"),
            ];
            if let Some(token) = next_token.as_deref() {
                params.push(("NextToken", token));
            }

            let response: RawInstanceTypesResponse = self.call_api(&params).await?;
            all.extend(response.instance_types.instance_type);

            next_token = response.next_token.filter(|t| !t.is_empty());
            if next_token.is_none() {
                break;
            }
            sleep(PAGE_DELAY).await;
        }

        all.retain(|t| !t.gpu_spec.contains('/'));
        Ok(all)
    }

    /// Keeps the types with at least one in-stock zone in the region.
    async fn filter_available(&self, types: Vec<RawInstanceType>) -> Vec<RawInstanceType> {
        let mut available = Vec::new();
        let total = types.len();

        for (batch_index, batch) in types.chunks(AVAILABILITY_BATCH).enumerate() {
            let checks = join_all(batch.iter().map(|t| self.check_availability(t))).await;
            for (instance_type, in_stock) in batch.iter().zip(checks) {
                if in_stock {
                    available.push(instance_type.clone());
                }
            }

            if (batch_index + 1) * AVAILABILITY_BATCH < total {
                sleep(BATCH_DELAY).await;
            }
        }

        available
    }

    async fn check_availability(&self, instance_type: &RawInstanceType) -> bool {
        let params: Vec<(&str, &str)> = vec![
            ("Action", "DescribeAvailableResource"),
            ("RegionId", REGION_ID),
            ("ResourceType", "instance"),
            ("DestinationResource", "Zone"),
            ("NetworkCategory", "vpc"),
            ("IoOptimized", "optimized"),
            ("InstanceType", &instance_type.instance_type_id),
        ];

        // A 400/404 here means the type is not sellable, not a failure.
        let Ok(response) = self.call_api::<RawAvailableResourceResponse>(&params).await else {
            return false;
        };

        response
            .available_zones
            .map(|zones| {
                zones.available_zone.iter().any(|zone| {
                    zone.status == "Available"
                        && zone
                            .status_category
                            .as_deref()
                            .map_or(true, |category| category == "WithStock")
                })
            })
            .unwrap_or(false)
    }

    async fn price_types(
        &self,
        types: &[RawInstanceType],
        observed_at: DateTime<Utc>,
    ) -> Vec<ProviderRow> {
        let mut rows = Vec::new();
        let total = types.len();

        for (batch_index, batch) in types.chunks(PRICE_BATCH).enumerate() {
            let prices = join_all(batch.iter().map(|t| self.price_one(t, observed_at))).await;
            rows.extend(prices.into_iter().flatten());

            if (batch_index + 1) * PRICE_BATCH < total {
                sleep(BATCH_DELAY).await;
            }
        }

        rows
    }

    async fn price_one(
        &self,
        instance_type: &RawInstanceType,
        observed_at: DateTime<Utc>,
    ) -> Option<ProviderRow> {
        let params: Vec<(&str, &str)> = vec![
            ("Action", "DescribePrice"),
            ("RegionId", REGION_ID),
            ("ResourceType", "instance"),
            ("InstanceType", &instance_type.instance_type_id),
            ("InstanceNetworkType", "vpc"),
            ("InternetMaxBandwidthOut", "0"),
            ("PriceUnit", "Hour"),
        ];

        let response = self.call_api::<RawPriceResponse>(&params).await.ok()?;
        let price = response.price_info?.price.trade_price;

        Some(build_row(instance_type, price, observed_at))
    }
}

#[async_trait]
impl SourceAdapter for AlibabaAdapter {
    fn name(&self) -> &'static str {
        "alibaba"
    }

    fn source_url(&self) -> &str {
        SOURCE_URL
    }

    fn enabled(&self) -> bool {
        self.access_key_id.is_some() && self.access_key_secret.is_some()
    }

    async fn scrape(&self) -> AdapterResult<ProviderResult> {
        self.credentials()?;
        let observed_at = Utc::now();

        let types = self.gpu_instance_types().await?;
        tracing::debug!(types = types.len(), "alibaba GPU instance types found");

        let available = self.filter_available(types).await;
        tracing::debug!(
            available = available.len(),
            region = REGION_ID,
            "alibaba types in stock"
        );

        let rows = self.price_types(&available, observed_at).await;

        // No page body to hash; the rows themselves are the source document.
        let encoded = serde_json::to_vec(&rows).unwrap_or_default();
        let source_hash = sha256_hex(&encoded);

        Ok(ProviderResult {
            provider: self.name().to_string(),
            rows,
            observed_at,
            source_hash,
        })
    }
}

fn build_row(
    instance_type: &RawInstanceType,
    price: Decimal,
    observed_at: DateTime<Utc>,
) -> ProviderRow {
    let gpu_model = if instance_type.gpu_spec.is_empty() {
        "Unknown".to_string()
    } else {
        instance_type.gpu_spec.clone()
    };

    ProviderRow {
        provider: "alibaba".to_string(),
        instance_id: Some(instance_type.instance_type_id.clone()),
        sku: None,
        gpu_model,
        gpu_count: (instance_type.gpu_amount > 0).then_some(instance_type.gpu_amount),
        vram_gb: (instance_type.gpu_memory_size > 0.0)
            .then_some(instance_type.gpu_memory_size as u32),
        vcpus: (instance_type.cpu_core_count > 0).then_some(instance_type.cpu_core_count),
        system_ram_gb: instance_type.memory_size,
        storage: None,
        price_hour_usd: Some(price),
        price_unit: PriceUnit::InstanceHour,
        class: OfferingClass::Gpu,
        deployment: classify(instance_type),
        source_url: SOURCE_URL.to_string(),
        observed_at,
    }
}

fn classify(instance_type: &RawInstanceType) -> DeploymentType {
    let family = &instance_type.instance_type_family;
    let id = &instance_type.instance_type_id;

    if family.starts_with("ecs.ebm") {
        DeploymentType::BareMetal
    } else if id.contains("-vws-") || family.contains("vgn") || family.contains("sgn") {
        DeploymentType::Vgpu
    } else {
        DeploymentType::VirtualMachine
    }
}

/// Canonicalized HMAC-SHA1 request signature per the ECS signing scheme.
fn sign_request(params: &[(String, String)], secret: &str) -> AdapterResult<String> {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let string_to_sign = format!("GET&{}&{}", percent_encode("/"), percent_encode(&canonical));

    let mut mac = HmacSha1::new_from_slice(format!("{secret}&").as_bytes())
        .map_err(|err| AdapterError::fetch(format!("invalid signing key: {err}")))?;
    mac.update(string_to_sign.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Signature-scheme percent encoding: unreserved characters pass through,
/// space becomes %20 and `*` becomes %2A.
fn percent_encode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'!' | b'\''
            | b'(' | b')' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}
