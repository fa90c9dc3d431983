pub mod pump;
pub mod store;

use std::sync::Arc;

use garde::Validate;
use tokio::sync::watch;

use crate::models::job::{Job, JobFile, JobId, JobOrigin};
use crate::queue::pump::JobExecutor;
use crate::queue::store::{QueueStore, Transition};
use crate::services::{ArtifactGallery, StegoService};

/// Enqueue-time validation for encode submissions. The short id is the
/// 7-character identifier the server embeds into the image.
#[derive(Debug, Validate)]
pub struct EncodeRequest {
    #[garde(length(chars, min = 7, max = 7))]
    pub short_id: String,
}

/// Handle to the task queue, the only surface through which UI code
/// mutates it. Cloning is cheap; all clones share the same store and
/// pump.
#[derive(Clone)]
pub struct TaskQueue {
    store: Arc<QueueStore>,
}

impl TaskQueue {
    /// Build the store and spawn the execution pump against the given
    /// collaborators. The queue starts running.
    pub fn new(stego: Arc<dyn StegoService>, gallery: Arc<dyn ArtifactGallery>) -> Self {
        let store = Arc::new(QueueStore::new());
        pump::spawn(Arc::clone(&store), JobExecutor::new(stego, gallery));
        Self { store }
    }

    /// Queue one encode job per file, in input order. Returns the created
    /// job ids; an invalid short id queues nothing and returns an empty
    /// vec.
    pub fn enqueue_encode(
        &self,
        files: Vec<JobFile>,
        short_id: &str,
        origin: JobOrigin,
    ) -> Vec<JobId> {
        let request = EncodeRequest {
            short_id: short_id.to_string(),
        };
        if let Err(report) = request.validate() {
            tracing::warn!(%report, "rejecting encode submission");
            return Vec::new();
        }
        let jobs: Vec<Job> = files
            .into_iter()
            .map(|file| Job::encode(file, short_id, origin))
            .collect();
        let ids: Vec<JobId> = jobs.iter().map(|job| job.id).collect();
        self.store.apply(Transition::Enqueue(jobs));
        ids
    }

    /// Queue one decode job per file. No payload to validate.
    pub fn enqueue_decode(&self, files: Vec<JobFile>, origin: JobOrigin) -> Vec<JobId> {
        let jobs: Vec<Job> = files
            .into_iter()
            .map(|file| Job::decode(file, origin))
            .collect();
        let ids: Vec<JobId> = jobs.iter().map(|job| job.id).collect();
        self.store.apply(Transition::Enqueue(jobs));
        ids
    }

    pub fn start_all(&self) {
        self.store.apply(Transition::SetRunning(true));
    }

    pub fn pause_all(&self) {
        self.store.apply(Transition::SetRunning(false));
    }

    pub fn clear_completed(&self) {
        self.store.apply(Transition::ClearCompleted);
    }

    /// Remove a job. A currently processing job is detached rather than
    /// aborted: the network call runs to completion and its outcome lands
    /// on a missing id, which is a no-op.
    pub fn cancel(&self, id: JobId) {
        self.store.apply(Transition::Remove(id));
    }

    /// Re-queue a job, clearing its previous outcome. Meaningful for
    /// failed jobs; on any other state it acts as a forced re-queue.
    pub fn retry(&self, id: JobId) {
        self.store.apply(Transition::Retry(id));
    }

    pub fn snapshot(&self) -> Vec<Job> {
        self.store.snapshot()
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.store.get(id)
    }

    pub fn is_running(&self) -> bool {
        self.store.is_running()
    }

    pub fn current_job_id(&self) -> Option<JobId> {
        self.store.current_job_id()
    }

    /// Change feed for UI readers: the value is a revision counter bumped
    /// on every store mutation; re-read `snapshot` when it ticks.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }

    /// Resolve once no job is waiting or in flight.
    pub async fn join_idle(&self) {
        let mut changes = self.store.subscribe();
        loop {
            if self.store.is_idle() {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    }
}
