//! Lambda pricing adapter.
//!
//! Lambda's pricing page embeds each instance-size tab as a JSON object
//! with escaped HTML, one per GPU count: `{"contentHtml":"...","label":"8x"}`.
//! The tab label carries the GPU count; VRAM and price inside the table are
//! quoted per GPU and are converted to instance totals here.

use crate::http::{fetch_page, FetchedBody};
use crate::parse::{clean_whitespace, compile, first_decimal, first_uint, selector};
use async_trait::async_trait;
use chrono::Utc;
use gpuatlas_core::{
    AdapterResult, DeploymentType, OfferingClass, PriceUnit, ProviderResult, ProviderRow,
    SourceAdapter,
};
use reqwest::Client;
use rust_decimal::Decimal;
use scraper::Html;

const PRICING_URL: &str = "https://lambda.ai/pricing";

pub struct LambdaAdapter {
    client: Client,
    url: String,
}

impl LambdaAdapter {
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
impl SourceAdapter for LambdaAdapter {
    fn name(&self) -> &'static str {
        "lambda"
    }

    fn source_url(&self) -> &str {
        &self.url
    }

    async fn scrape(&self) -> AdapterResult<ProviderResult> {
        let FetchedBody { body, sha256 } = fetch_page(&self.client, &self.url).await?;
        let observed_at = Utc::now();
        let rows = parse_pricing_page(&body, &self.url)?;

        Ok(ProviderResult {
            provider: self.name().to_string(),
            rows,
            observed_at,
            source_hash: sha256,
        })
    }
}

fn parse_pricing_page(html: &str, source_url: &str) -> AdapterResult<Vec<ProviderRow>> {
    let observed_at = Utc::now();
    let mut rows = Vec::new();

    // One object per instance-size tab; the pattern matches each tab
    // individually to avoid backtracking across the whole document.
    let tab_pattern = compile(r#"\{"contentHtml":"((?:[^"\\]|\\.)*)","label":"(\d+)x"\}"#)?;
    let row_sel = selector(r#"tr[class*="_pricingRow_"]"#)?;
    let model_sel = selector("th")?;
    let vram_sel = selector(r#"td[data-label*="VRAM"]"#)?;
    let vcpus_sel = selector(r#"td[data-label*="vCPU"]"#)?;
    let ram_sel = selector(r#"td[data-label="RAM"]"#)?;
    let storage_sel = selector(r#"td[data-label*="STORAGE"]"#)?;
    let price_sel = selector(r#"td[data-label*="PRICE"]"#)?;

    let mut tab_count = 0usize;
    for captures in tab_pattern.captures_iter(html) {
        let (Some(content), Some(label)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        let Ok(gpu_count) = label.as_str().parse::<u32>() else {
            continue;
        };
        tab_count += 1;

        let table_html = unescape_embedded_html(content.as_str());
        let fragment = Html::parse_fragment(&table_html);

        for row in fragment.select(&row_sel) {
            let text_of = |sel| {
                row.select(sel)
                    .next()
                    .map(|el| clean_whitespace(&el.text().collect::<String>()))
                    .unwrap_or_default()
            };

            let gpu_model = text_of(&model_sel);
            let vram_per_gpu = first_uint(&text_of(&vram_sel));
            let vcpus = first_uint(&text_of(&vcpus_sel));
            let system_ram_gb = first_decimal(&text_of(&ram_sel));
            let storage = text_of(&storage_sel);
            let price_per_gpu = first_decimal(&text_of(&price_sel));

            // VRAM and price are per GPU; a row without all three fields
            // is a header or a layout change, not an offer.
            let (Some(vram_per_gpu), Some(price_per_gpu)) = (vram_per_gpu, price_per_gpu) else {
                continue;
            };
            if gpu_model.is_empty() || vram_per_gpu == 0 || price_per_gpu.is_zero() {
                continue;
            }

            let total_price = (price_per_gpu * Decimal::from(gpu_count)).round_dp(2);
            let instance_id = format!(
                "{gpu_count}x-{}",
                gpu_model.to_lowercase().replace(' ', "-")
            );

            rows.push(ProviderRow {
                provider: "lambda".to_string(),
                instance_id: Some(instance_id),
                sku: None,
                gpu_model,
                gpu_count: Some(gpu_count),
                vram_gb: Some(vram_per_gpu * gpu_count),
                vcpus,
                system_ram_gb,
                storage: (!storage.is_empty()).then_some(storage),
                price_hour_usd: Some(total_price),
                price_unit: PriceUnit::InstanceHour,
                class: OfferingClass::Gpu,
                deployment: DeploymentType::VirtualMachine,
                source_url: source_url.to_string(),
                observed_at,
            });
        }
    }

    if tab_count == 0 {
        tracing::warn!("no pricing tabs found on Lambda page, layout may have changed");
    }

    Ok(rows)
}

// The embedded HTML arrives with angle brackets and slashes encoded as
// literal `\u003C`-style sequences and quotes backslash-escaped.
fn unescape_embedded_html(content: &str) -> String {
    content
        .replace(r"\u003C", "<")
        .replace(r"\u003E", ">")
        .replace(r"\u002F", "/")
        .replace(r#"\""#, "\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::build_client;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Encodes plain HTML the way the pricing page embeds it: angle
    /// brackets and slashes as literal `\u003C` sequences, quotes
    /// backslash-escaped.
    fn escape_embedded(html: &str) -> String {
        html.replace('<', r"\u003C")
            .replace('>', r"\u003E")
            .replace('/', r"\u002F")
            .replace('"', r#"\""#)
    }

    fn fixture() -> String {
        let table = concat!(
            r#"<table>"#,
            r#"<tr class="_pricingRow_z1nfw_36">"#,
            r#"<th>NVIDIA H100 SXM</th>"#,
            r#"<td data-label="VRAM PER GPU">80 GB</td>"#,
            r#"<td data-label="vCPUs">208</td>"#,
            r#"<td data-label="RAM">1800 GiB</td>"#,
            r#"<td data-label="STORAGE">26 TiB</td>"#,
            r#"<td data-label="PRICE PER GPU">$2.99</td>"#,
            r#"</tr>"#,
            r#"</table>"#,
        );
        format!(
            r#"<script>{{"contentHtml":"{}","label":"8x"}}</script>"#,
            escape_embedded(table)
        )
    }

    #[test]
    fn unescape_decodes_embedded_sequences() {
        assert_eq!(
            unescape_embedded_html(r"\u003Ctable\u003E\u003C\u002Ftable\u003E"),
            "<table></table>"
        );
        assert_eq!(
            unescape_embedded_html(r#"\u003Ctd data-label=\"RAM\"\u003E"#),
            r#"<td data-label="RAM">"#
        );
    }

    #[test]
    fn parses_tab_and_converts_per_gpu_values_to_totals() {
        let rows = parse_pricing_page(&fixture(), PRICING_URL).unwrap();
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.gpu_model, "NVIDIA H100 SXM");
        assert_eq!(row.gpu_count, Some(8));
        assert_eq!(row.vram_gb, Some(640));
        assert_eq!(row.vcpus, Some(208));
        assert_eq!(row.system_ram_gb, Some(dec!(1800)));
        assert_eq!(row.price_hour_usd, Some(dec!(23.92)));
        assert_eq!(row.instance_id.as_deref(), Some("8x-nvidia-h100-sxm"));
        assert_eq!(row.deployment, DeploymentType::VirtualMachine);
    }

    #[test]
    fn page_without_tabs_yields_no_rows() {
        let rows = parse_pricing_page("<html><body>redesigned</body></html>", PRICING_URL).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn rows_missing_price_or_vram_are_skipped() {
        let table = concat!(
            r#"<tr class="_pricingRow_a">"#,
            r#"<th>NVIDIA GH200</th>"#,
            r#"<td data-label="VRAM PER GPU">96 GB</td>"#,
            r#"<td data-label="PRICE PER GPU">Contact us</td>"#,
            r#"</tr>"#,
        );
        let html = format!(
            r#"{{"contentHtml":"{}","label":"1x"}}"#,
            escape_embedded(table)
        );
        let rows = parse_pricing_page(&html, PRICING_URL).unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn scrape_returns_rows_and_a_body_hash() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pricing"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture()))
            .mount(&server)
            .await;

        let client = build_client(Duration::from_secs(5)).unwrap();
        let adapter = LambdaAdapter::new(client).with_url(format!("{}/pricing", server.uri()));

        let result = adapter.scrape().await.unwrap();
        assert_eq!(result.provider, "lambda");
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.source_hash.len(), 64);
    }
}
