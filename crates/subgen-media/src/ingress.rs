//! Upload ingress: validation and scoped temporary storage.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use subgen_models::JobId;

use crate::error::{MediaError, MediaResult};

/// Extensions accepted for upload. Covers the audio and video
/// containers the transcription model can decode.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "wav", "mp3", "m4a", "aac", "flac", "ogg", "opus", "mp4", "mkv", "webm", "mov", "avi",
];

/// Stores uploaded media under a scoped directory, one subdirectory per
/// job id, so no two jobs can ever collide on a path.
#[derive(Debug, Clone)]
pub struct MediaStore {
    media_dir: PathBuf,
}

impl MediaStore {
    /// Create a media store rooted at `media_dir`.
    pub fn new(media_dir: impl Into<PathBuf>) -> Self {
        Self {
            media_dir: media_dir.into(),
        }
    }

    /// Directory owned by one job.
    pub fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.media_dir.join(job_id.as_str())
    }

    /// Validate an upload and write it to the job's directory.
    ///
    /// The write goes to a temp file first and is renamed into place;
    /// if anything fails, the partial file is removed so a failed
    /// submit leaves nothing behind.
    pub async fn store_upload(
        &self,
        bytes: &[u8],
        filename: &str,
        job_id: &JobId,
    ) -> MediaResult<PathBuf> {
        if bytes.is_empty() {
            return Err(MediaError::EmptyUpload);
        }

        let name = sanitize_filename(filename)?;
        let ext = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .ok_or_else(|| MediaError::InvalidFilename(filename.to_string()))?;
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(MediaError::UnsupportedExtension(ext));
        }

        let dir = self.job_dir(job_id);
        fs::create_dir_all(&dir).await?;

        let dest = dir.join(&name);
        let tmp = dest.with_extension(format!("{}.part", ext));

        if let Err(e) = fs::write(&tmp, bytes).await {
            let _ = fs::remove_file(&tmp).await;
            let _ = fs::remove_dir(&dir).await;
            return Err(MediaError::Io(e));
        }
        if let Err(e) = fs::rename(&tmp, &dest).await {
            let _ = fs::remove_file(&tmp).await;
            let _ = fs::remove_dir(&dir).await;
            return Err(MediaError::Io(e));
        }

        debug!(job_id = %job_id, path = %dest.display(), size = bytes.len(), "stored upload");
        Ok(dest)
    }
}

/// Reduce a declared filename to its final component, rejecting names
/// that would escape the job directory.
fn sanitize_filename(filename: &str) -> MediaResult<String> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| MediaError::InvalidFilename(filename.to_string()))?;

    if name.is_empty() || name == "." || name == ".." {
        return Err(MediaError::InvalidFilename(filename.to_string()));
    }
    Ok(name)
}

/// Delete a file if it exists. Returns whether a file was removed;
/// deleting an already-deleted path is not an error.
pub async fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => {
            warn!(path = %path.display(), "failed to delete file: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn stores_upload_under_job_dir() {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(dir.path());
        let job_id = JobId::new();

        let path = store
            .store_upload(b"RIFF....", "lecture.wav", &job_id)
            .await
            .unwrap();

        assert!(path.starts_with(store.job_dir(&job_id)));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"RIFF....");
    }

    #[tokio::test]
    async fn rejects_empty_payload() {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(dir.path());
        let err = store
            .store_upload(b"", "a.wav", &JobId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::EmptyUpload));
        assert!(err.is_invalid_input());
    }

    #[tokio::test]
    async fn rejects_unsupported_and_missing_extensions() {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(dir.path());
        let job_id = JobId::new();

        let err = store.store_upload(b"x", "notes.txt", &job_id).await.unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedExtension(_)));

        let err = store.store_upload(b"x", "noext", &job_id).await.unwrap_err();
        assert!(matches!(err, MediaError::InvalidFilename(_)));

        // Nothing was left on disk for the failed job
        assert!(!store.job_dir(&job_id).exists());
    }

    #[tokio::test]
    async fn sanitizes_path_components() {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(dir.path());
        let job_id = JobId::new();

        let path = store
            .store_upload(b"x", "../../etc/evil.mp3", &job_id)
            .await
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "evil.mp3");
        assert!(path.starts_with(store.job_dir(&job_id)));
    }

    #[tokio::test]
    async fn two_jobs_never_collide() {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(dir.path());

        let a = store.store_upload(b"a", "same.mp3", &JobId::new()).await.unwrap();
        let b = store.store_upload(b"b", "same.mp3", &JobId::new()).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(tokio::fs::read(&a).await.unwrap(), b"a");
        assert_eq!(tokio::fs::read(&b).await.unwrap(), b"b");
    }

    #[tokio::test]
    async fn remove_if_exists_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.srt");
        tokio::fs::write(&path, "x").await.unwrap();

        assert!(remove_if_exists(&path).await.unwrap());
        assert!(!remove_if_exists(&path).await.unwrap());
    }
}
