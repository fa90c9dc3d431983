pub mod gallery;
pub mod stego;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::models::job::JobFile;

pub use self::gallery::GalleryError;
pub use self::stego::StegoError;

/// Upload-progress callback, invoked with a fraction in [0, 1]. Callers
/// may fire it in bursts; the queue tolerates that.
pub type ProgressFn = Box<dyn Fn(f64) + Send + Sync>;

/// Structured outcome of a decode call. `success == false` is an answer
/// from the service (nothing embedded in the image), distinct from a
/// transport or protocol failure, which surfaces as a [`StegoError`].
#[derive(Debug, Clone, Default)]
pub struct DecodeOutcome {
    pub success: bool,
    pub message: Option<String>,
    pub model_used: Option<String>,
    pub error: Option<String>,
}

/// Remote steganography service.
#[async_trait]
pub trait StegoService: Send + Sync {
    /// Embed `short_id` into the image and return a local path to the
    /// produced PNG artifact.
    async fn encode(
        &self,
        file: &JobFile,
        short_id: &str,
        on_progress: ProgressFn,
    ) -> Result<PathBuf, StegoError>;

    /// Extract the embedded identifier from the image.
    async fn decode(&self, file: &JobFile, on_progress: ProgressFn)
        -> Result<DecodeOutcome, StegoError>;
}

/// Persists finished encode artifacts (the phone-gallery seam).
#[async_trait]
pub trait ArtifactGallery: Send + Sync {
    /// Store the artifact and return the asset id it was saved under.
    async fn save(&self, artifact: &Path) -> Result<String, GalleryError>;
}
