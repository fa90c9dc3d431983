use std::sync::Arc;

use tracing::Instrument;

use crate::models::job::{Job, JobId, JobKind, JobResult};
use crate::queue::store::{QueueStore, Transition};
use crate::services::{ArtifactGallery, ProgressFn, StegoService};

/// Per-job execution logic: calls the remote stego service, streams
/// upload progress back into the store and persists encode artifacts
/// through the gallery.
pub struct JobExecutor {
    stego: Arc<dyn StegoService>,
    gallery: Arc<dyn ArtifactGallery>,
}

impl JobExecutor {
    pub fn new(stego: Arc<dyn StegoService>, gallery: Arc<dyn ArtifactGallery>) -> Self {
        Self { stego, gallery }
    }

    /// Run one claimed job to completion. Every failure is converted into
    /// a `Failed` transition here; nothing propagates to the pump, and the
    /// in-flight slot is always released afterwards so later jobs can run.
    pub async fn run(&self, store: &Arc<QueueStore>, job: Job) {
        let id = job.id;
        let span = tracing::info_span!("job", job_id = %id, kind = %job.kind);
        async {
            tracing::info!(
                file = %job.file.path.display(),
                attempt = job.metrics.attempt,
                "processing job"
            );
            match self.execute(store, &job).await {
                Ok(result) => {
                    tracing::info!("job succeeded");
                    store.apply(Transition::CompleteSuccess(id, result));
                }
                Err(message) => {
                    tracing::warn!(error = %message, "job failed");
                    store.apply(Transition::CompleteFailure(id, message));
                }
            }
            store.apply(Transition::ReleaseCurrent);
        }
        .instrument(span)
        .await;
    }

    async fn execute(&self, store: &Arc<QueueStore>, job: &Job) -> Result<JobResult, String> {
        let progress = Self::progress_reporter(store, job.id);
        match job.kind {
            JobKind::Encode => {
                let short_id = job
                    .short_id
                    .as_deref()
                    .ok_or_else(|| "encode job has no short id".to_string())?;
                let artifact = self
                    .stego
                    .encode(&job.file, short_id, progress)
                    .await
                    .map_err(|e| e.to_string())?;
                let asset_id = self
                    .gallery
                    .save(&artifact)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(JobResult::Encode {
                    output_path: artifact,
                    saved_asset_id: asset_id,
                    saved: true,
                })
            }
            JobKind::Decode => {
                let outcome = self
                    .stego
                    .decode(&job.file, progress)
                    .await
                    .map_err(|e| e.to_string())?;
                if !outcome.success {
                    return Err(outcome
                        .error
                        .unwrap_or_else(|| "decode failed".to_string()));
                }
                let extracted_id = outcome
                    .message
                    .ok_or_else(|| "decode response carried no message".to_string())?;
                Ok(JobResult::Decode {
                    extracted_id,
                    model_used: outcome.model_used,
                })
            }
        }
    }

    fn progress_reporter(store: &Arc<QueueStore>, id: JobId) -> ProgressFn {
        let store = Arc::clone(store);
        Box::new(move |fraction| store.apply(Transition::ReportProgress(id, fraction)))
    }
}

/// Spawn the execution pump: a single task that wakes on every store
/// change, claims at most one eligible job at a time and runs it to
/// completion before claiming the next. Together with the atomic claim in
/// the store this yields the single-flight guarantee.
pub fn spawn(store: Arc<QueueStore>, executor: JobExecutor) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut changes = store.subscribe();
        loop {
            while let Some(job) = store.claim_next() {
                executor.run(&store, job).await;
            }
            if changes.changed().await.is_err() {
                break;
            }
        }
    })
}
