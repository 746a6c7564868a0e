//! Cached query layer over the offer catalog.

pub mod cache;
pub mod queries;

pub use cache::{CacheError, MemoryTagCache, TagCache};
pub use queries::{CachedOfferQueries, OfferReader, PRICING_TAG};
