//! Time-series sample store.
//!
//! Observations are truncated to a bucket before writing: price streams
//! bucket to the UTC calendar day, latency/throughput streams keep the raw
//! timestamp. Bucketing bounds storage growth and makes re-ingestion
//! idempotent: writing the same stream twice updates rows in place through
//! the `(subject, dimension, bucket)` conflict clause instead of inserting
//! duplicates.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::BTreeSet;

/// Bucket truncation granularity for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// Collapse to the UTC calendar day (price streams).
    Day,
    /// Keep the raw observation timestamp (latency/throughput streams).
    Raw,
}

/// How a batch interacts with rows already present for its streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// Clear each (subject, dimension) stream in the batch, then insert.
    /// Used when the upstream source has no stable history and may revise
    /// past values.
    FullReplace,
    /// Upsert without clearing. Used when history is cumulative and must
    /// be preserved across runs.
    Append,
}

/// One observation heading into the store.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Stable key or endpoint id the observation belongs to.
    pub subject: String,
    /// Metric stream within the subject, e.g. "price" or "latency".
    pub dimension: String,
    pub observed_at: DateTime<Utc>,
    pub value: Decimal,
    pub provider: Option<String>,
}

/// One stored point, already bucketed.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, serde::Serialize, serde::Deserialize)]
pub struct SamplePoint {
    pub bucket: DateTime<Utc>,
    pub value: Decimal,
    pub scraped_at: DateTime<Utc>,
}

/// Truncates an observation timestamp to its storage bucket.
#[must_use]
pub fn bucket_timestamp(ts: DateTime<Utc>, granularity: Granularity) -> DateTime<Utc> {
    match granularity {
        Granularity::Day => Utc.from_utc_datetime(&ts.date_naive().and_time(NaiveTime::MIN)),
        Granularity::Raw => ts,
    }
}

/// Repository for bucketed time-series samples.
#[derive(Debug, Clone)]
pub struct SampleStore {
    pool: PgPool,
}

impl SampleStore {
    /// Creates a new store over the shared pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserts a batch of samples, bucketing each timestamp first.
    ///
    /// Conflicts on `(subject, dimension, bucket)` are expected control
    /// flow: the conflict clause updates value and scraped-at in place, so
    /// re-ingesting an identical batch changes nothing. In
    /// `IngestMode::FullReplace` each stream present in the batch is
    /// cleared inside the same transaction before inserting.
    ///
    /// # Returns
    /// The number of samples written (inserted or updated).
    ///
    /// # Errors
    /// Returns an error if the database transaction fails.
    pub async fn upsert_samples(
        &self,
        samples: &[Sample],
        granularity: Granularity,
        mode: IngestMode,
    ) -> Result<u64> {
        if samples.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin sample transaction")?;

        if mode == IngestMode::FullReplace {
            let streams: BTreeSet<(&str, &str)> = samples
                .iter()
                .map(|s| (s.subject.as_str(), s.dimension.as_str()))
                .collect();
            for (subject, dimension) in streams {
                sqlx::query("DELETE FROM price_samples WHERE subject = $1 AND dimension = $2")
                    .bind(subject)
                    .bind(dimension)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let scraped_at = Utc::now();
        let mut written = 0u64;
        for sample in samples {
            let bucket = bucket_timestamp(sample.observed_at, granularity);
            sqlx::query(
                r"
                INSERT INTO price_samples (subject, dimension, bucket, value, provider, scraped_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (subject, dimension, bucket) DO UPDATE
                SET value = EXCLUDED.value,
                    provider = EXCLUDED.provider,
                    scraped_at = EXCLUDED.scraped_at
                ",
            )
            .bind(&sample.subject)
            .bind(&sample.dimension)
            .bind(bucket)
            .bind(sample.value)
            .bind(sample.provider.as_deref())
            .bind(scraped_at)
            .execute(&mut *tx)
            .await?;
            written += 1;
        }

        tx.commit().await.context("failed to commit samples")?;

        tracing::debug!(written, ?mode, "sample batch stored");
        Ok(written)
    }

    /// Returns all points for one subject, ordered by bucket ascending,
    /// optionally restricted to a single dimension.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_series(
        &self,
        subject: &str,
        dimension: Option<&str>,
    ) -> Result<Vec<SamplePoint>> {
        let points = match dimension {
            Some(dimension) => {
                sqlx::query_as::<_, SamplePoint>(
                    r"
                    SELECT bucket, value, scraped_at
                    FROM price_samples
                    WHERE subject = $1 AND dimension = $2
                    ORDER BY bucket ASC
                    ",
                )
                .bind(subject)
                .bind(dimension)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, SamplePoint>(
                    r"
                    SELECT bucket, value, scraped_at
                    FROM price_samples
                    WHERE subject = $1
                    ORDER BY bucket ASC
                    ",
                )
                .bind(subject)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(points)
    }

    /// Deletes rows whose bucket is at or past the retention horizon.
    ///
    /// Pure count-returning deletion; rows newer than the horizon are never
    /// touched and nothing cascades.
    ///
    /// # Errors
    /// Returns an error if the database deletion fails.
    pub async fn prune_older_than(&self, days: i64) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(days);

        let result = sqlx::query("DELETE FROM price_samples WHERE bucket <= $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        tracing::info!(days, removed, "retention prune completed");
        Ok(removed)
    }
}
