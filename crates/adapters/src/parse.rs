//! Small text-extraction helpers shared by the HTML adapters.

use gpuatlas_core::{AdapterError, AdapterResult};
use regex::Regex;
use rust_decimal::Decimal;
use scraper::Selector;
use std::str::FromStr;

/// Compiles a regex, mapping pattern errors into the adapter taxonomy.
pub(crate) fn compile(pattern: &str) -> AdapterResult<Regex> {
    Regex::new(pattern).map_err(|err| AdapterError::parse(format!("bad pattern: {err}")))
}

/// Compiles a CSS selector, mapping errors into the adapter taxonomy.
pub(crate) fn selector(css: &str) -> AdapterResult<Selector> {
    Selector::parse(css).map_err(|err| AdapterError::parse(format!("bad selector: {err}")))
}

/// Extracts the first dollar amount from text like "$3.29/GPU/hr".
pub(crate) fn first_dollar_amount(text: &str) -> Option<Decimal> {
    let re = Regex::new(r"\$?([0-9]+(?:\.[0-9]+)?)").ok()?;
    let captured = re.captures(text)?;
    Decimal::from_str(captured.get(1)?.as_str()).ok()
}

/// Extracts the first unsigned integer from text like "80 GB" or "208 vCPUs".
pub(crate) fn first_uint(text: &str) -> Option<u32> {
    let re = Regex::new(r"([0-9]+)").ok()?;
    let captured = re.captures(text)?;
    captured.get(1)?.as_str().parse().ok()
}

/// Extracts the first decimal number from text like "1.5 TB".
pub(crate) fn first_decimal(text: &str) -> Option<Decimal> {
    let re = Regex::new(r"([0-9]+(?:\.[0-9]+)?)").ok()?;
    let captured = re.captures(text)?;
    Decimal::from_str(captured.get(1)?.as_str()).ok()
}

/// Collapses runs of whitespace into single spaces and trims.
pub(crate) fn clean_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
