use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use crate::services::ArtifactGallery;

/// Gallery backed by a plain directory: every saved artifact gets a fresh
/// uuid file name, which doubles as its asset id.
pub struct DirGallery {
    dir: PathBuf,
}

impl DirGallery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ArtifactGallery for DirGallery {
    async fn save(&self, artifact: &Path) -> Result<String, GalleryError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(GalleryError::Io)?;

        let extension = artifact
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("png");
        let asset_id = format!("{}.{}", Uuid::new_v4(), extension);

        match tokio::fs::copy(artifact, self.dir.join(&asset_id)).await {
            Ok(_) => {
                tracing::debug!(asset_id = %asset_id, "artifact saved to gallery");
                Ok(asset_id)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(GalleryError::MissingArtifact(artifact.to_path_buf()))
            }
            Err(e) => Err(GalleryError::Io(e)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error("artifact not found: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("gallery I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
