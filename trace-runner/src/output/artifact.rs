//! Artifact persistence
//!
//! A file destination is written through a temporary file in the same
//! directory and renamed into place, so a reader never sees a partial image.
//! The final file is world-readable so it can be collected from the pod.

use log::info;
use std::fs::Permissions;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::domain::{OutputDestination, PipelineError};

const ARTIFACT_MODE: u32 = 0o644;

/// A written output artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// `None` when written to stdout
    pub path: Option<PathBuf>,
    pub bytes: usize,
}

/// Write `content` to `destination`, using `default_name` inside directories.
///
/// # Errors
/// Returns [`PipelineError::WriteArtifact`] if the file cannot be written.
pub async fn write_artifact(
    content: &[u8],
    destination: &OutputDestination,
    default_name: &str,
) -> Result<Artifact, PipelineError> {
    let Some(path) = destination.file_path(default_name) else {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(content).await?;
        stdout.flush().await?;
        return Ok(Artifact { path: None, bytes: content.len() });
    };

    persist(content, &path)
        .map_err(|source| PipelineError::WriteArtifact { path: path.clone(), source })?;
    info!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(Artifact { path: Some(path), bytes: content.len() })
}

/// World-readable temporary file next to `path`, to be persisted over it.
pub(crate) fn staging_file(path: &Path) -> std::io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file = NamedTempFile::new_in(dir)?;
    file.as_file().set_permissions(Permissions::from_mode(ARTIFACT_MODE))?;
    Ok(file)
}

fn persist(content: &[u8], path: &Path) -> std::io::Result<()> {
    let mut file = staging_file(path)?;
    file.write_all(content)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
