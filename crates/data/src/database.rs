use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Connection pool plus schema bootstrap for the gpuatlas database.
#[derive(Debug, Clone)]
pub struct DatabaseClient {
    pool: PgPool,
}

impl DatabaseClient {
    /// Creates a new database client connected to the specified `PostgreSQL`
    /// database and runs pending migrations.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established or a
    /// migration fails.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Returns a handle to the underlying pool for store construction.
    #[must_use]
    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }
}
