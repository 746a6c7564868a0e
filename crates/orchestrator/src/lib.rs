//! Sequential scrape orchestration.
//!
//! Runs the fixed adapter registry strictly in order, never concurrently: a
//! pacing delay before every call but the first keeps third-party rate
//! limiting and anti-automation defenses out of the picture. Each call is
//! raced against a fixed per-adapter timeout; on timeout the orchestrator
//! abandons the call and moves on. Dropping the timed-out future means a
//! late-arriving response has nowhere to land; results only ever flow out
//! of a call that completed inside its budget.
//!
//! One adapter's failure is isolated into its run summary. Only a run in
//! which *every* attempted adapter fails raises an error.

use chrono::{DateTime, Utc};
use gpuatlas_core::{AdapterError, ProviderResult, ScrapeRunSummary, SourceAdapter};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout, Instant};

/// Pacing and timeout knobs for a run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Delay inserted before each adapter call except the first.
    pub pacing: Duration,
    /// Wall-clock budget per adapter call.
    pub adapter_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pacing: Duration::from_secs(1),
            adapter_timeout: Duration::from_secs(60),
        }
    }
}

/// Aggregate outcome of one orchestrated run.
#[derive(Debug)]
pub struct ScrapeRunResult {
    pub provider_results: Vec<ProviderResult>,
    pub scraped_at: DateTime<Utc>,
    /// SHA-256 over (adapter name, per-adapter source hash) in registry
    /// order, for whole-run change detection.
    pub source_hash: String,
    pub summaries: Vec<ScrapeRunSummary>,
}

/// Raised only when zero adapters succeeded in a run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("all {count} adapters failed: {details}")]
    AllAdaptersFailed {
        /// Number of adapters attempted.
        count: usize,
        /// `provider: error` pairs, semicolon-joined.
        details: String,
    },
}

impl OrchestratorError {
    fn all_failed(summaries: &[ScrapeRunSummary]) -> Self {
        let details = summaries
            .iter()
            .map(|s| {
                format!(
                    "{}: {}",
                    s.provider,
                    s.error.as_deref().unwrap_or("unknown error")
                )
            })
            .collect::<Vec<_>>()
            .join("; ");
        Self::AllAdaptersFailed {
            count: summaries.len(),
            details,
        }
    }
}

/// Drives the adapter registry through one complete scrape run.
///
/// The registry is injected, so tests substitute doubles freely. Holds no
/// persistence handles: orchestration is pure network-call sequencing.
pub struct ScrapeOrchestrator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    config: OrchestratorConfig,
}

impl ScrapeOrchestrator {
    #[must_use]
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, config: OrchestratorConfig) -> Self {
        Self { adapters, config }
    }

    /// Runs every enabled adapter in registry order.
    ///
    /// `limit` caps the number of adapters attempted, useful for smoke
    /// tests against a subset of sources.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::AllAdaptersFailed` only when at least one
    /// adapter was attempted and none succeeded. Partial failure is a
    /// successful run with failure summaries.
    pub async fn scrape_all(
        &self,
        limit: Option<usize>,
    ) -> Result<ScrapeRunResult, OrchestratorError> {
        let scraped_at = Utc::now();
        let mut hasher = Sha256::new();
        let mut provider_results: Vec<ProviderResult> = Vec::new();
        let mut summaries: Vec<ScrapeRunSummary> = Vec::new();
        let mut first = true;

        for adapter in &self.adapters {
            if !adapter.enabled() {
                tracing::debug!(provider = adapter.name(), "skipping disabled adapter");
                continue;
            }
            if let Some(limit) = limit {
                if summaries.len() >= limit {
                    break;
                }
            }

            if !first {
                sleep(self.config.pacing).await;
            }
            first = false;

            let start = Instant::now();
            let outcome = timeout(self.config.adapter_timeout, adapter.scrape()).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match outcome {
                Ok(Ok(result)) => {
                    hasher.update(adapter.name().as_bytes());
                    hasher.update(result.source_hash.as_bytes());
                    tracing::info!(
                        provider = adapter.name(),
                        rows = result.rows.len(),
                        duration_ms,
                        "adapter scrape succeeded"
                    );
                    summaries.push(ScrapeRunSummary {
                        provider: adapter.name().to_string(),
                        rows_scraped: result.rows.len(),
                        duration_ms,
                        success: true,
                        source_hash: Some(result.source_hash.clone()),
                        error: None,
                    });
                    provider_results.push(result);
                }
                Ok(Err(err)) => {
                    tracing::warn!(
                        provider = adapter.name(),
                        duration_ms,
                        error = %err,
                        "adapter scrape failed"
                    );
                    summaries.push(Self::failure_summary(adapter.name(), duration_ms, &err));
                }
                Err(_) => {
                    let err = AdapterError::timeout(self.config.adapter_timeout.as_secs());
                    tracing::warn!(
                        provider = adapter.name(),
                        duration_ms,
                        "adapter scrape timed out"
                    );
                    summaries.push(Self::failure_summary(adapter.name(), duration_ms, &err));
                }
            }
        }

        if provider_results.is_empty() && !summaries.is_empty() {
            return Err(OrchestratorError::all_failed(&summaries));
        }

        Ok(ScrapeRunResult {
            provider_results,
            scraped_at,
            source_hash: hex::encode(hasher.finalize()),
            summaries,
        })
    }

    fn failure_summary(provider: &str, duration_ms: u64, err: &AdapterError) -> ScrapeRunSummary {
        ScrapeRunSummary {
            provider: provider.to_string(),
            rows_scraped: 0,
            duration_ms,
            success: false,
            source_hash: None,
            error: Some(err.to_string()),
        }
    }
}
