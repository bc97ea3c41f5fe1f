use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// Thin wrapper over `sqlx::PgPool`, grounded on the teacher's
/// `rag-embedding-worker/src/database/pool.rs` (the `rag-api-server`
/// equivalent was not present in the retrieval pack; the two crates share
/// the identical `PgPoolOptions` pattern).
#[derive(Clone)]
pub struct DbPool {
    pool: PgPool,
}

impl DbPool {
    pub async fn new(url: &str, max_size: u32, timeout_secs: u64) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_size)
            .acquire_timeout(Duration::from_secs(timeout_secs))
            .connect(url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        info!("database pool established, max_connections={max_size}");

        Ok(Self { pool })
    }

    pub fn get(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
