use crate::pipeline::DocumentPipeline;
use rag_core::config::JobConfig;
use rag_core::db::repository::Repository;
use rag_core::error::EngineResult;
use rand::Rng;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Periodic scheduler (C9, spec.md §4.9) that leases `QUEUED` (or
/// lease-expired `PROCESSING`) jobs under a pessimistic row lock and
/// dispatches them onto a bounded, optionally staggered set of tasks.
/// Redesigned from the teacher's LISTEN/NOTIFY push model
/// (`worker/mod.rs`'s `NotificationListener`) to the poll-lease model
/// spec.md requires — see SPEC_FULL.md for the rationale.
pub struct JobWorkerPool {
    repo: Repository,
    pipeline: Arc<DocumentPipeline>,
    config: JobConfig,
}

impl JobWorkerPool {
    pub fn new(repo: Repository, pipeline: Arc<DocumentPipeline>, config: JobConfig) -> Self {
        Self {
            repo,
            pipeline,
            config,
        }
    }

    /// Runs forever, ticking every `job.tick_ms`. Each tick leases up to
    /// `batch_size` jobs in one transaction, then spawns one task per job
    /// (staggered by `job.stagger_ms` to avoid an upstream API surge).
    pub async fn run(self: Arc<Self>) {
        info!("job worker pool started, tick={}ms", self.config.tick_ms);
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(self.config.tick_ms));
        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                error!("job lease tick failed: {e}");
            }
        }
    }

    async fn tick(&self) -> EngineResult<()> {
        let jobs = self.repo.lease_jobs(self.config.batch_size as i64).await?;
        if jobs.is_empty() {
            return Ok(());
        }
        info!("leased {} job(s)", jobs.len());

        let mut handles = Vec::with_capacity(jobs.len());
        for (i, job) in jobs.into_iter().enumerate() {
            if i > 0 && self.config.stagger_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.config.stagger_ms)).await;
            }
            let repo = self.repo.clone();
            let pipeline = self.pipeline.clone();
            let lock_duration_secs = self.config.lock_duration_secs;
            handles.push(tokio::spawn(async move {
                Self::run_job(repo, pipeline, job, lock_duration_secs).await;
            }));
        }
        for h in handles {
            let _ = h.await;
        }
        Ok(())
    }

    async fn run_job(
        repo: Repository,
        pipeline: Arc<DocumentPipeline>,
        job: rag_core::models::ProcessingJob,
        lock_duration_secs: i64,
    ) {
        let worker_id = format!("worker-{}", random_suffix(8));

        if let Err(e) = repo.start_job(job.id, &worker_id, lock_duration_secs).await {
            error!("failed to start job {}: {e}", job.id);
            return;
        }

        // Re-read attempts as incremented by `start_job` for the retry
        // decision below.
        let mut job = job;
        job.attempts += 1;

        match pipeline.process_document(job.document_id).await {
            Ok(()) => {
                if let Err(e) = repo.complete_job(job.id).await {
                    error!("failed to mark job {} completed: {e}", job.id);
                }
            }
            Err(e) => {
                warn!("job {} failed (attempt {}/{}): {e}", job.id, job.attempts, job.max_attempts);
                match repo.fail_job(&job, &e.to_string()).await {
                    Ok(true) => {
                        // Final failure — the pipeline already wrote
                        // Document.status=FAILED via its own error path.
                        error!("job {} exhausted retries, document marked FAILED", job.id);
                    }
                    Ok(false) => {
                        info!("job {} requeued for retry", job.id);
                    }
                    Err(e) => error!("failed to record job {} failure: {e}", job.id),
                }
            }
        }
    }
}

fn random_suffix(len: usize) -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CHARS[rng.random_range(0..CHARS.len())] as char)
        .collect()
}
