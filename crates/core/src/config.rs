use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scrape: ScrapeConfig,
    pub cache: CacheConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Delay inserted before every adapter call except the first, in ms.
    pub pacing_ms: u64,
    /// Per-adapter wall-clock budget, in seconds.
    pub adapter_timeout_secs: u64,
    /// Per-request HTTP timeout inside adapters, in seconds.
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    /// Serialized results above this size are never admitted to the cache.
    pub max_entry_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Samples strictly older than this horizon are pruned.
    pub days: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/gpuatlas".to_string(),
                max_connections: 10,
            },
            scrape: ScrapeConfig {
                pacing_ms: 1_000,
                adapter_timeout_secs: 60,
                http_timeout_secs: 30,
            },
            cache: CacheConfig {
                ttl_secs: 43_200,
                max_entry_bytes: 2 * 1024 * 1024,
            },
            retention: RetentionConfig { days: 90 },
        }
    }
}
