//! Provider source adapters.
//!
//! Each adapter turns one provider's public pricing surface into
//! normalized [`gpuatlas_core::ProviderRow`]s behind the shared
//! [`SourceAdapter`] contract. Three parse styles cover the fleet: HTML
//! tables (Lambda, Vultr, Hot Aisle), JSON embedded in or served as the
//! page (DigitalOcean, AWS), and a signed query API (Alibaba).

use gpuatlas_core::{AdapterResult, SourceAdapter};
use std::sync::Arc;
use std::time::Duration;

pub mod alibaba;
pub mod aws;
pub mod digitalocean;
pub mod hotaisle;
pub mod http;
pub mod lambda;
mod parse;
pub mod vultr;

pub use alibaba::AlibabaAdapter;
pub use aws::AwsAdapter;
pub use digitalocean::DigitalOceanAdapter;
pub use hotaisle::HotAisleAdapter;
pub use lambda::LambdaAdapter;
pub use vultr::VultrAdapter;

/// Builds the full adapter registry over one shared HTTP client.
///
/// Order is the scrape order; adapters that report themselves disabled
/// (Alibaba without credentials) are skipped by the orchestrator, not
/// omitted here.
///
/// # Errors
/// Returns an error if the HTTP client fails to initialize.
pub fn registry(http_timeout: Duration) -> AdapterResult<Vec<Arc<dyn SourceAdapter>>> {
    let client = http::build_client(http_timeout)?;

    Ok(vec![
        Arc::new(LambdaAdapter::new(client.clone())),
        Arc::new(VultrAdapter::new(client.clone())),
        Arc::new(DigitalOceanAdapter::new(client.clone())),
        Arc::new(HotAisleAdapter::new(client.clone())),
        Arc::new(AwsAdapter::new(client.clone())),
        Arc::new(AlibabaAdapter::from_env(client)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lists_every_provider_once() {
        let adapters = registry(Duration::from_secs(5)).unwrap();
        let names: Vec<&str> = adapters.iter().map(|a| a.name()).collect();
        assert_eq!(
            names,
            vec!["lambda", "vultr", "digitalocean", "hotaisle", "aws", "alibaba"]
        );
    }
}
