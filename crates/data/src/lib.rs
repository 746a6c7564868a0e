//! Postgres persistence for the offer catalog and time-series samples.

pub mod catalog;
pub mod database;
pub mod samples;

pub use catalog::{
    CatalogStats, FacetCount, FilteredOffers, OfferBatch, OfferCatalogStore, OfferFacets,
    OfferQuery, OfferRecord, SortOrder,
};
pub use database::DatabaseClient;
pub use samples::{
    bucket_timestamp, Granularity, IngestMode, Sample, SamplePoint, SampleStore,
};
