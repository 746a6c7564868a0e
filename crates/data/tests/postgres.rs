//! Store-level tests against a live Postgres database.
//!
//! Gated behind `#[ignore]`: run with
//! `GPUATLAS_TEST_DATABASE_URL=postgresql://... cargo test -p gpuatlas-data -- --ignored`.
//! Sample tests use unique subjects so they can run concurrently; the
//! catalog test owns the whole `offer_catalog` table and is the only test
//! touching it.

use chrono::{Duration, Utc};
use gpuatlas_core::{
    row_audit_hash, stable_key, CanonicalOffer, DeploymentType, OfferingClass, PriceUnit,
    ProviderRow,
};
use gpuatlas_data::{
    DatabaseClient, Granularity, IngestMode, OfferBatch, OfferCatalogStore, OfferQuery, Sample,
    SampleStore,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

async fn connect() -> DatabaseClient {
    let url = std::env::var("GPUATLAS_TEST_DATABASE_URL")
        .expect("GPUATLAS_TEST_DATABASE_URL must point at a scratch database");
    DatabaseClient::new(&url, 5).await.expect("connect")
}

fn unique_subject(label: &str) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("test:{label}:{nanos}")
}

fn price_sample(subject: &str, value: Decimal, observed_at: chrono::DateTime<Utc>) -> Sample {
    Sample {
        subject: subject.to_string(),
        dimension: "price".to_string(),
        observed_at,
        value,
        provider: Some("lambda".to_string()),
    }
}

fn offer(provider: &str, model: &str, gpu_count: u32, price: Decimal) -> CanonicalOffer {
    let row = ProviderRow {
        provider: provider.to_string(),
        instance_id: Some(format!("{gpu_count}x-{}", model.to_lowercase())),
        sku: None,
        gpu_model: model.to_string(),
        gpu_count: Some(gpu_count),
        vram_gb: Some(80 * gpu_count),
        vcpus: Some(26 * gpu_count),
        system_ram_gb: Some(Decimal::from(240 * gpu_count)),
        storage: None,
        price_hour_usd: Some(price),
        price_unit: PriceUnit::InstanceHour,
        class: OfferingClass::Gpu,
        deployment: DeploymentType::VirtualMachine,
        source_url: format!("https://{provider}.example/pricing"),
        observed_at: Utc::now(),
    };
    CanonicalOffer {
        stable_key: stable_key(&row),
        audit_hash: row_audit_hash(provider, row.observed_at, &row),
        row,
    }
}

#[tokio::test]
#[ignore]
async fn reingesting_a_day_bucketed_stream_is_idempotent() {
    let db = connect().await;
    let store = SampleStore::new(db.pool());
    let subject = unique_subject("idempotent");

    let morning = price_sample(&subject, dec!(23.92), Utc::now() - Duration::hours(8));
    let evening = price_sample(&subject, dec!(21.50), Utc::now());

    store
        .upsert_samples(
            &[morning.clone(), evening.clone()],
            Granularity::Day,
            IngestMode::Append,
        )
        .await
        .unwrap();
    let first = store.get_series(&subject, Some("price")).await.unwrap();

    // Same UTC day: both observations collapse into one row carrying the
    // later value.
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].value, dec!(21.50));

    store
        .upsert_samples(&[morning, evening], Granularity::Day, IngestMode::Append)
        .await
        .unwrap();
    let second = store.get_series(&subject, Some("price")).await.unwrap();

    assert_eq!(second.len(), 1);
    assert_eq!(second[0].value, dec!(21.50));
}

#[tokio::test]
#[ignore]
async fn full_replace_clears_only_the_streams_in_the_batch() {
    let db = connect().await;
    let store = SampleStore::new(db.pool());
    let replaced = unique_subject("replaced");
    let untouched = unique_subject("untouched");

    store
        .upsert_samples(
            &[
                price_sample(&replaced, dec!(10.00), Utc::now() - Duration::days(2)),
                price_sample(&replaced, dec!(11.00), Utc::now() - Duration::days(1)),
                price_sample(&untouched, dec!(5.00), Utc::now()),
            ],
            Granularity::Day,
            IngestMode::Append,
        )
        .await
        .unwrap();

    store
        .upsert_samples(
            &[price_sample(&replaced, dec!(12.00), Utc::now())],
            Granularity::Day,
            IngestMode::FullReplace,
        )
        .await
        .unwrap();

    let replaced_series = store.get_series(&replaced, Some("price")).await.unwrap();
    assert_eq!(replaced_series.len(), 1);
    assert_eq!(replaced_series[0].value, dec!(12.00));

    let untouched_series = store.get_series(&untouched, Some("price")).await.unwrap();
    assert_eq!(untouched_series.len(), 1);
    assert_eq!(untouched_series[0].value, dec!(5.00));
}

#[tokio::test]
#[ignore]
async fn prune_removes_only_rows_past_the_horizon() {
    let db = connect().await;
    let store = SampleStore::new(db.pool());
    let subject = unique_subject("prune");

    store
        .upsert_samples(
            &[
                price_sample(&subject, dec!(9.00), Utc::now() - Duration::days(120)),
                price_sample(&subject, dec!(8.00), Utc::now()),
            ],
            Granularity::Day,
            IngestMode::Append,
        )
        .await
        .unwrap();

    let removed = store.prune_older_than(90).await.unwrap();
    assert!(removed >= 1);

    let series = store.get_series(&subject, Some("price")).await.unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].value, dec!(8.00));
}

#[tokio::test]
#[ignore]
async fn replace_all_swaps_the_catalog_generation() {
    let db = connect().await;
    let store = OfferCatalogStore::new(db.pool());

    let first = vec![OfferBatch {
        provider: "lambda".to_string(),
        source_hash: "a".repeat(64),
        offers: vec![
            offer("lambda", "NVIDIA H100 SXM", 8, dec!(23.92)),
            offer("lambda", "NVIDIA GH200", 1, dec!(1.49)),
        ],
    }];
    assert_eq!(store.replace_all(&first).await.unwrap(), 2);

    let second = vec![OfferBatch {
        provider: "vultr".to_string(),
        source_hash: "b".repeat(64),
        offers: vec![offer("vultr", "NVIDIA HGX H100", 8, dec!(20.72))],
    }];
    assert_eq!(store.replace_all(&second).await.unwrap(), 1);

    let result = store
        .get_offers_filtered(&OfferQuery::default())
        .await
        .unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.offers.len(), 1);
    assert_eq!(result.offers[0].provider, "vultr");
    assert_eq!(result.offers[0].gpu_model, "NVIDIA HGX H100");
}
