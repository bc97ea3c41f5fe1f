use rag_core::chunker::Chunker;
use rag_core::db::{DbPool, PgVectorStore, Repository, VectorStore};
use rag_core::embedding::EmbeddingService;
use rag_core::key_pool::ApiKeyPool;
use rag_core::storage::{FileStorage, LocalFileStorage};
use rag_worker::config::WorkerSettings;
use rag_worker::job_pool::JobWorkerPool;
use rag_worker::pipeline::DocumentPipeline;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rag_worker::logging::init()?;
    info!("starting ingestion worker");

    let settings = WorkerSettings::load()?;
    info!("configuration loaded");

    let db_url = settings.engine.database.resolve_url()?;
    let db_pool = DbPool::new(
        &db_url,
        settings.engine.database.pool_max_size,
        settings.engine.database.pool_timeout_seconds,
    )
    .await?;
    info!("database connected");

    let repo = Repository::new(db_pool.clone());
    let vector_store: Arc<dyn VectorStore> = Arc::new(PgVectorStore::new(db_pool));
    let storage: Arc<dyn FileStorage> = Arc::new(LocalFileStorage::new(settings.storage.dir));

    let key_pool = Arc::new(ApiKeyPool::new(
        settings.engine.key_pool.keys,
        settings.engine.key_pool.bucket_capacity,
        settings.engine.key_pool.bucket_refill_per_sec,
        settings.engine.key_pool.max_consecutive_failures,
        settings.engine.key_pool.disable_duration_secs,
        settings.engine.key_pool.max_wait_ms,
    ));

    let embedding = Arc::new(EmbeddingService::new(
        settings.engine.embedding.base_url,
        settings.engine.embedding.model,
        settings.engine.embedding.dimension,
        settings.engine.embedding.batch_max,
        settings.engine.embedding.min_interval_ms,
        settings.engine.embedding.max_retries,
        key_pool,
    ));

    let chunker = Chunker::new(&settings.engine.chunking);

    let pipeline = Arc::new(DocumentPipeline::new(
        repo.clone(),
        vector_store,
        storage,
        embedding,
        chunker,
        settings.engine.job.clone(),
    ));

    let pool = Arc::new(JobWorkerPool::new(repo, pipeline, settings.engine.job));

    tokio::select! {
        _ = pool.run() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("failed to listen for shutdown signal: {e}");
            }
            info!("shutdown signal received, draining in-flight jobs");
        }
    }

    Ok(())
}
