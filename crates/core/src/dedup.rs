//! Configuration-key deduplication.
//!
//! Providers frequently list the same hardware configuration more than once
//! (per region, per zone, per commitment tier). Only the lowest-priced
//! offer is retained per configuration.

use crate::identity::{row_audit_hash, stable_key};
use crate::normalize::canonical_model;
use crate::types::{CanonicalOffer, ProviderRow};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Grouping key for candidate offers: the descriptive configuration,
/// price excluded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConfigKey {
    model: String,
    gpu_count: Option<u32>,
    vcpus: Option<u32>,
    system_ram_gb: Option<Decimal>,
}

impl ConfigKey {
    fn of(row: &ProviderRow) -> Self {
        Self {
            model: canonical_model(&row.gpu_model),
            gpu_count: row.gpu_count,
            vcpus: row.vcpus,
            system_ram_gb: row.system_ram_gb.map(|r| r.normalize()),
        }
    }
}

/// Collapses one provider's rows to one `CanonicalOffer` per configuration.
///
/// Rules, in order:
/// - A candidate with a non-positive price is invalid and dropped outright.
///   An absent price is different: it means "unpriced / contact sales" and
///   the candidate stays eligible.
/// - Among priced candidates sharing a key, the minimum price wins. Ties go
///   to the first candidate encountered in the input order (adapters emit
///   deterministic order, so this is stable across runs).
/// - An unpriced candidate is retained only while no priced candidate
///   shares its key; any priced candidate replaces it.
///
/// Output preserves first-seen key order.
#[must_use]
pub fn dedupe_lowest_price(rows: Vec<ProviderRow>) -> Vec<CanonicalOffer> {
    let mut order: Vec<ConfigKey> = Vec::new();
    let mut best: HashMap<ConfigKey, ProviderRow> = HashMap::new();

    for row in rows {
        if let Some(price) = row.price_hour_usd {
            if price <= Decimal::ZERO {
                tracing::warn!(
                    provider = %row.provider,
                    model = %row.gpu_model,
                    %price,
                    "dropping candidate with non-positive price"
                );
                continue;
            }
        }

        let key = ConfigKey::of(&row);
        match best.get(&key) {
            None => {
                order.push(key.clone());
                best.insert(key, row);
            }
            Some(current) => {
                let replace = match (current.price_hour_usd, row.price_hour_usd) {
                    // Priced always beats unpriced.
                    (None, Some(_)) => true,
                    (Some(_), None) => false,
                    // Strictly lower price wins; ties keep the incumbent.
                    (Some(held), Some(candidate)) => candidate < held,
                    (None, None) => false,
                };
                if replace {
                    best.insert(key, row);
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| best.remove(&key))
        .map(|row| CanonicalOffer {
            stable_key: stable_key(&row),
            audit_hash: row_audit_hash(&row.provider, row.observed_at, &row),
            row,
        })
        .collect()
}
