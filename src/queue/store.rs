use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::watch;

use crate::models::job::{Job, JobId, JobResult, JobStatus};

/// Closed set of queue mutations. Every change goes through
/// [`QueueStore::apply`]; there is no free-form patching, so a job can
/// never carry a result and an error at the same time.
#[derive(Debug)]
pub enum Transition {
    /// Append jobs at the tail, preserving input order. Each enters
    /// `Queued`.
    Enqueue(Vec<Job>),
    /// Delete a job from any state. Idempotent.
    Remove(JobId),
    /// Enable or disable the pump.
    SetRunning(bool),
    /// Mark a job `Processing`, bump its attempt counter and record it as
    /// the in-flight job. Ignored while another job is in flight.
    BeginProcessing(JobId),
    /// Upload progress in [0, 1]. A missing id is a no-op, which is what
    /// makes late callbacks after a cancel harmless.
    ReportProgress(JobId, f64),
    CompleteSuccess(JobId, JobResult),
    CompleteFailure(JobId, String),
    /// Clear the in-flight slot. Issued by the executor after every run as
    /// the backstop for jobs that were removed mid-flight.
    ReleaseCurrent,
    /// Re-queue a job, clearing any previous outcome.
    Retry(JobId),
    /// Drop every `Success`/`Failed` job, preserving the order of the
    /// rest.
    ClearCompleted,
}

#[derive(Debug)]
struct QueueState {
    jobs: Vec<Job>,
    running: bool,
    current_job_id: Option<JobId>,
}

/// Sole owner of all job records, plus the pump-enable flag and the
/// in-flight job id. Insertion order defines queue order. State lives
/// behind a mutex so the single-flight invariant holds on a
/// multi-threaded runtime; every mutation bumps a revision published on a
/// watch channel for the pump and UI readers.
pub struct QueueStore {
    state: Mutex<QueueState>,
    revision: watch::Sender<u64>,
}

impl QueueStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0u64);
        Self {
            state: Mutex::new(QueueState {
                jobs: Vec::new(),
                running: true,
                current_job_id: None,
            }),
            revision,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // recover the guard even if a writer panicked
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one transition and notify watchers.
    pub fn apply(&self, transition: Transition) {
        {
            let mut state = self.lock();
            Self::step(&mut state, transition);
            Self::refresh_positions(&mut state);
            Self::publish_depth(&state);
        }
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// Atomically select the first eligible job and mark it `Processing`.
    /// The whole read-check-transition runs under the state lock; together
    /// with the pump awaiting each execution inline this is the
    /// single-flight guarantee.
    pub fn claim_next(&self) -> Option<Job> {
        let claimed = {
            let mut state = self.lock();
            if !state.running || state.current_job_id.is_some() {
                return None;
            }
            let id = state
                .jobs
                .iter()
                .find(|job| job.status.is_eligible())
                .map(|job| job.id)?;
            Self::step(&mut state, Transition::BeginProcessing(id));
            Self::refresh_positions(&mut state);
            Self::publish_depth(&state);
            state.jobs.iter().find(|job| job.id == id).cloned()
        };
        self.revision.send_modify(|rev| *rev += 1);
        claimed
    }

    pub fn snapshot(&self) -> Vec<Job> {
        self.lock().jobs.clone()
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.lock().jobs.iter().find(|job| job.id == id).cloned()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn current_job_id(&self) -> Option<JobId> {
        self.lock().current_job_id
    }

    /// True when nothing is waiting or in flight.
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.current_job_id.is_none()
            && !state
                .jobs
                .iter()
                .any(|job| job.status.is_eligible() || job.status == JobStatus::Processing)
    }

    /// Change feed; the value is a revision counter bumped on every
    /// mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn step(state: &mut QueueState, transition: Transition) {
        let now = Utc::now();
        match transition {
            Transition::Enqueue(jobs) => {
                metrics::counter!("stega_jobs_enqueued_total").increment(jobs.len() as u64);
                for mut job in jobs {
                    job.status = JobStatus::Queued;
                    job.updated_at = now;
                    tracing::debug!(job_id = %job.id, kind = %job.kind, "job enqueued");
                    state.jobs.push(job);
                }
            }
            Transition::Remove(id) => {
                state.jobs.retain(|job| job.id != id);
            }
            Transition::SetRunning(running) => {
                state.running = running;
            }
            Transition::BeginProcessing(id) => {
                if state.current_job_id.is_some() {
                    tracing::warn!(job_id = %id, "ignoring claim while another job is in flight");
                    return;
                }
                if let Some(job) = state.jobs.iter_mut().find(|job| job.id == id) {
                    job.status = JobStatus::Processing;
                    job.metrics.attempt += 1;
                    job.metrics.started_at = Some(now);
                    job.updated_at = now;
                    state.current_job_id = Some(id);
                }
            }
            Transition::ReportProgress(id, fraction) => {
                if let Some(job) = state.jobs.iter_mut().find(|job| job.id == id) {
                    job.metrics.upload_progress = fraction.clamp(0.0, 1.0);
                    job.updated_at = now;
                }
            }
            Transition::CompleteSuccess(id, result) => {
                if let Some(job) = state.jobs.iter_mut().find(|job| job.id == id) {
                    job.status = JobStatus::Success;
                    job.result = Some(result);
                    job.error = None;
                    job.metrics.finished_at = Some(now);
                    job.updated_at = now;
                    metrics::counter!("stega_jobs_completed").increment(1);
                    if let Some(started) = job.metrics.started_at {
                        metrics::histogram!("stega_job_processing_seconds")
                            .record((now - started).num_milliseconds() as f64 / 1000.0);
                    }
                    if state.current_job_id == Some(id) {
                        state.current_job_id = None;
                    }
                }
            }
            Transition::CompleteFailure(id, message) => {
                if let Some(job) = state.jobs.iter_mut().find(|job| job.id == id) {
                    job.status = JobStatus::Failed;
                    job.error = Some(message);
                    job.result = None;
                    job.metrics.finished_at = Some(now);
                    job.updated_at = now;
                    metrics::counter!("stega_jobs_failed").increment(1);
                    if state.current_job_id == Some(id) {
                        state.current_job_id = None;
                    }
                }
            }
            Transition::ReleaseCurrent => {
                state.current_job_id = None;
            }
            Transition::Retry(id) => {
                if let Some(job) = state.jobs.iter_mut().find(|job| job.id == id) {
                    job.status = JobStatus::Queued;
                    job.error = None;
                    job.result = None;
                    job.updated_at = now;
                }
            }
            Transition::ClearCompleted => {
                state.jobs.retain(|job| !job.status.is_terminal());
            }
        }
    }

    fn refresh_positions(state: &mut QueueState) {
        let mut position = 0;
        for job in &mut state.jobs {
            if job.status.is_eligible() {
                job.metrics.queue_position = Some(position);
                position += 1;
            } else {
                job.metrics.queue_position = None;
            }
        }
    }

    fn publish_depth(state: &QueueState) {
        let depth = state.jobs.iter().filter(|job| job.status.is_eligible()).count();
        metrics::gauge!("stega_queue_depth").set(depth as f64);
    }
}

impl Default for QueueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{JobFile, JobOrigin};
    use uuid::Uuid;

    fn decode_job(name: &str) -> Job {
        let mut file = JobFile::new(format!("/photos/{name}"));
        file.name = Some(name.to_string());
        Job::decode(file, JobOrigin::Gallery)
    }

    fn sample_result() -> JobResult {
        JobResult::Decode {
            extracted_id: "AB12xy9".to_string(),
            model_used: None,
        }
    }

    #[test]
    fn enqueue_preserves_order_and_marks_queued() {
        let store = QueueStore::new();
        let jobs = vec![decode_job("a.jpg"), decode_job("b.jpg")];
        let ids: Vec<_> = jobs.iter().map(|job| job.id).collect();

        store.apply(Transition::Enqueue(jobs));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.iter().map(|job| job.id).collect::<Vec<_>>(), ids);
        assert!(snapshot.iter().all(|job| job.status == JobStatus::Queued));
        assert_eq!(snapshot[0].metrics.queue_position, Some(0));
        assert_eq!(snapshot[1].metrics.queue_position, Some(1));
    }

    #[test]
    fn claim_is_single_flight() {
        let store = QueueStore::new();
        store.apply(Transition::Enqueue(vec![
            decode_job("a.jpg"),
            decode_job("b.jpg"),
        ]));

        let first = store.claim_next().expect("first claim");
        assert_eq!(first.status, JobStatus::Processing);
        assert_eq!(first.metrics.attempt, 1);
        assert!(first.metrics.started_at.is_some());
        assert_eq!(store.current_job_id(), Some(first.id));

        // no second claim while the first is in flight
        assert!(store.claim_next().is_none());

        store.apply(Transition::CompleteSuccess(first.id, sample_result()));
        store.apply(Transition::ReleaseCurrent);
        let second = store.claim_next().expect("second claim");
        assert_ne!(second.id, first.id);
    }

    #[test]
    fn claim_respects_running_flag() {
        let store = QueueStore::new();
        store.apply(Transition::SetRunning(false));
        store.apply(Transition::Enqueue(vec![decode_job("a.jpg")]));

        assert!(store.claim_next().is_none());

        store.apply(Transition::SetRunning(true));
        assert!(store.claim_next().is_some());
    }

    #[test]
    fn transitions_on_missing_ids_are_noops() {
        let store = QueueStore::new();
        let ghost = Uuid::new_v4();

        store.apply(Transition::ReportProgress(ghost, 0.5));
        store.apply(Transition::CompleteSuccess(ghost, sample_result()));
        store.apply(Transition::CompleteFailure(ghost, "late".to_string()));
        store.apply(Transition::Retry(ghost));
        store.apply(Transition::Remove(ghost));

        assert!(store.snapshot().is_empty());
        assert!(store.current_job_id().is_none());
    }

    #[test]
    fn completion_clears_the_inflight_slot() {
        let store = QueueStore::new();
        store.apply(Transition::Enqueue(vec![decode_job("a.jpg")]));

        let claimed = store.claim_next().expect("claim");
        store.apply(Transition::CompleteSuccess(claimed.id, sample_result()));

        assert!(store.current_job_id().is_none());
        let job = store.get(claimed.id).expect("job");
        assert_eq!(job.status, JobStatus::Success);
        assert!(job.metrics.finished_at.is_some());
    }

    #[test]
    fn retry_requeues_and_clears_outcome() {
        let store = QueueStore::new();
        let job = decode_job("a.jpg");
        let id = job.id;
        store.apply(Transition::Enqueue(vec![job]));

        let claimed = store.claim_next().expect("claim");
        store.apply(Transition::CompleteFailure(claimed.id, "boom".to_string()));
        store.apply(Transition::ReleaseCurrent);

        store.apply(Transition::Retry(id));
        let job = store.get(id).expect("job");
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.error.is_none());
        assert!(job.result.is_none());

        // retrying an already queued job is a semantic no-op
        store.apply(Transition::Retry(id));
        assert_eq!(store.get(id).expect("job").status, JobStatus::Queued);
    }

    #[test]
    fn attempt_counter_only_increases() {
        let store = QueueStore::new();
        let job = decode_job("a.jpg");
        let id = job.id;
        store.apply(Transition::Enqueue(vec![job]));

        let claimed = store.claim_next().expect("claim");
        assert_eq!(claimed.metrics.attempt, 1);
        store.apply(Transition::CompleteFailure(id, "boom".to_string()));
        store.apply(Transition::ReleaseCurrent);
        store.apply(Transition::Retry(id));

        let claimed = store.claim_next().expect("second claim");
        assert_eq!(claimed.metrics.attempt, 2);

        store.apply(Transition::CompleteFailure(id, "gone".to_string()));
        let job = store.get(id).expect("job");
        assert!(job.result.is_none());
        assert!(job.error.is_some());
    }

    #[test]
    fn clear_completed_keeps_survivor_order() {
        let store = QueueStore::new();
        let jobs = vec![
            decode_job("a.jpg"),
            decode_job("b.jpg"),
            decode_job("c.jpg"),
            decode_job("d.jpg"),
        ];
        let ids: Vec<_> = jobs.iter().map(|job| job.id).collect();
        store.apply(Transition::Enqueue(jobs));

        // a succeeds, b fails, c and d stay queued
        let a = store.claim_next().expect("claim a");
        store.apply(Transition::CompleteSuccess(a.id, sample_result()));
        store.apply(Transition::ReleaseCurrent);
        let b = store.claim_next().expect("claim b");
        store.apply(Transition::CompleteFailure(b.id, "boom".to_string()));
        store.apply(Transition::ReleaseCurrent);

        store.apply(Transition::ClearCompleted);

        let remaining: Vec<_> = store.snapshot().iter().map(|job| job.id).collect();
        assert_eq!(remaining, vec![ids[2], ids[3]]);
        assert!(store
            .snapshot()
            .iter()
            .all(|job| job.status == JobStatus::Queued));
    }

    #[test]
    fn progress_is_clamped() {
        let store = QueueStore::new();
        let job = decode_job("a.jpg");
        let id = job.id;
        store.apply(Transition::Enqueue(vec![job]));

        store.apply(Transition::ReportProgress(id, 1.7));
        assert_eq!(store.get(id).expect("job").metrics.upload_progress, 1.0);
        store.apply(Transition::ReportProgress(id, -0.3));
        assert_eq!(store.get(id).expect("job").metrics.upload_progress, 0.0);
    }
}
