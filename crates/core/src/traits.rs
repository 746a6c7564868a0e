//! The source-adapter contract.

use crate::error::AdapterResult;
use crate::types::ProviderResult;
use async_trait::async_trait;

/// One isolated external pricing source.
///
/// Implementations must not raise for a single malformed row; skip it and
/// continue. Raising is reserved for total failure (network error, page
/// structure no longer recognizable). Returning zero rows is a valid
/// outcome, not an error: the source currently lists no matching offers.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short lowercase provider id, e.g. "lambda".
    fn name(&self) -> &'static str;

    /// The page or API endpoint this adapter reads.
    fn source_url(&self) -> &str;

    /// Disabled adapters are skipped by the orchestrator without a summary.
    fn enabled(&self) -> bool {
        true
    }

    /// Fetch and parse the source into normalized rows.
    async fn scrape(&self) -> AdapterResult<ProviderResult>;
}
