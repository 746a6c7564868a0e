//! Identity keys and audit hashes.
//!
//! Two different identities serve two different jobs. The *stable key* is
//! built only from immutable descriptive attributes, so the same logical
//! offering maps to the same key across independent scrape runs even though
//! the catalog is wiped and replaced each run; user references keyed on it
//! survive the wipe. The *audit hash* covers the full payload plus the
//! observation timestamp and therefore changes every run; it doubles as the
//! catalog row id.

use crate::normalize::canonical_model;
use crate::types::ProviderRow;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of arbitrary bytes.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Derives the stable identity key for a row.
///
/// Segments, lowercased and colon-joined, skipping absent fields:
/// provider, canonical model, unit count (`8x`), vCPUs, RAM (`200gb`),
/// deployment type. Price, observed-at, and volatile per-scrape identifiers
/// (instance id, sku) are deliberately excluded.
///
/// Known limitation: if an adapter's field layout changes, the key silently
/// drifts for that provider's offerings. Not auto-corrected.
#[must_use]
pub fn stable_key(row: &ProviderRow) -> String {
    let mut segments: Vec<String> = Vec::with_capacity(6);

    let provider = row.provider.to_lowercase().trim().to_string();
    if !provider.is_empty() {
        segments.push(provider);
    }

    let model = canonical_model(&row.gpu_model);
    if !model.is_empty() {
        segments.push(model);
    }

    if let Some(count) = row.gpu_count.filter(|c| *c > 0) {
        segments.push(format!("{count}x"));
    }

    if let Some(vcpus) = row.vcpus.filter(|v| *v > 0) {
        segments.push(vcpus.to_string());
    }

    if let Some(ram) = row.system_ram_gb {
        segments.push(format!("{}gb", ram.normalize()));
    }

    segments.push(row.deployment.key_segment().to_string());

    segments.join(":")
}

/// Per-run audit hash over the full row payload plus observation metadata.
///
/// Intentionally volatile: re-scraping the identical offer on a different
/// run yields a different hash because `observed_at` differs.
#[must_use]
pub fn row_audit_hash(provider: &str, observed_at: DateTime<Utc>, row: &ProviderRow) -> String {
    let payload = serde_json::to_string(row).unwrap_or_else(|_| format!("{row:?}"));
    let input = format!("{provider}|{}|{payload}", observed_at.to_rfc3339());
    sha256_hex(input.as_bytes())
}
