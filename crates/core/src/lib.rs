//! Core types, contracts, and pure logic for the gpuatlas pricing pipeline.

pub mod config;
pub mod config_loader;
pub mod dedup;
pub mod error;
pub mod identity;
pub mod normalize;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use config_loader::ConfigLoader;
pub use dedup::dedupe_lowest_price;
pub use error::{AdapterError, AdapterResult};
pub use identity::{row_audit_hash, sha256_hex, stable_key};
pub use normalize::{canonical_model, normalize_gpu_model};
pub use traits::SourceAdapter;
pub use types::{
    CanonicalOffer, DeploymentType, OfferingClass, PriceUnit, ProviderResult, ProviderRow,
    ScrapeRunSummary,
};
