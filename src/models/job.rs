use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strum::Display;
use uuid::Uuid;

pub type JobId = Uuid;

/// Kind of steganography work a job performs. Immutable after creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    /// Embed a short identifier into a photo; the server returns a PNG.
    Encode,
    /// Extract the embedded identifier from a photo.
    Decode,
}

/// Where the source image came from. Informational only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobOrigin {
    Capture,
    Gallery,
}

/// Lifecycle state of a job. Cancellation is not a state: a canceled job
/// is removed from the store entirely.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Queued,
    Processing,
    Success,
    Failed,
}

impl JobStatus {
    /// Pending and Queued jobs are equally eligible for execution; Pending
    /// only exists between job construction and the enqueue transition.
    pub fn is_eligible(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Queued)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }
}

/// Source image reference plus display metadata. The metadata is carried
/// for UI display and never validated by the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFile {
    pub path: PathBuf,
    pub name: Option<String>,
    pub size_bytes: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl JobFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: None,
            size_bytes: None,
            width: None,
            height: None,
        }
    }

    /// Name sent to the server as the multipart file name.
    pub fn upload_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| {
                self.path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "image.jpg".to_string())
    }
}

/// Progress metrics for one job. `attempt` only ever increases; it is
/// bumped by the claim transition, so a retried job shows attempt 2.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobMetrics {
    /// Upload progress in [0, 1].
    pub upload_progress: f64,
    pub attempt: u32,
    /// Position among currently waiting jobs, None once claimed.
    pub queue_position: Option<usize>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Outcome of a successfully finished job; the shape depends on the kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobResult {
    Encode {
        /// Local path of the PNG returned by the server.
        output_path: PathBuf,
        saved_asset_id: String,
        saved: bool,
    },
    Decode {
        extracted_id: String,
        model_used: Option<String>,
    },
}

/// One unit of encode or decode work submitted to the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub origin: JobOrigin,
    pub file: JobFile,
    /// 7-character identifier to embed; set for encode jobs only.
    pub short_id: Option<String>,
    pub status: JobStatus,
    pub metrics: JobMetrics,
    /// Set only in `Success`; cleared by any non-success transition.
    pub result: Option<JobResult>,
    /// Set only in `Failed`.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    fn new(kind: JobKind, origin: JobOrigin, file: JobFile, short_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            origin,
            file,
            short_id,
            status: JobStatus::Pending,
            metrics: JobMetrics::default(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn encode(file: JobFile, short_id: impl Into<String>, origin: JobOrigin) -> Self {
        Self::new(JobKind::Encode, origin, file, Some(short_id.into()))
    }

    pub fn decode(file: JobFile, origin: JobOrigin) -> Self {
        Self::new(JobKind::Decode, origin, file, None)
    }
}
