use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::MediaType;

/// Staging area for uploaded marksheets.
///
/// Every upload gets a fresh UUID filename so concurrent requests never
/// collide; the returned [`TempUpload`] owns the file.
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create upload directory: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn unique_path(&self, media_type: MediaType) -> PathBuf {
        self.root
            .join(format!("{}.{}", Uuid::new_v4(), media_type.extension()))
    }

    /// Write uploaded bytes to a uniquely named file
    pub fn stage_bytes(&self, bytes: &[u8], media_type: MediaType) -> Result<TempUpload> {
        let path = self.unique_path(media_type);
        fs::write(&path, bytes)
            .with_context(|| format!("failed to stage upload: {}", path.display()))?;
        debug!(path = %path.display(), bytes = bytes.len(), "upload staged");
        Ok(TempUpload::adopt(path, media_type))
    }

    /// Copy an existing file into the staging area
    pub fn stage_file(&self, source: &Path, media_type: MediaType) -> Result<TempUpload> {
        let path = self.unique_path(media_type);
        fs::copy(source, &path).with_context(|| {
            format!(
                "failed to stage {} as {}",
                source.display(),
                path.display()
            )
        })?;
        debug!(source = %source.display(), path = %path.display(), "upload staged");
        Ok(TempUpload::adopt(path, media_type))
    }
}

/// An uploaded file that is deleted when dropped, on every exit path.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
    media_type: MediaType,
}

impl TempUpload {
    /// Take ownership of a file already written to temporary storage
    pub fn adopt(path: impl Into<PathBuf>, media_type: MediaType) -> Self {
        Self {
            path: path.into(),
            media_type,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        discard(&self.path);
    }
}

/// Remove a staged file, logging anything other than it already being gone
pub fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "temporary upload removed"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            path = %path.display(),
            error = %err,
            "failed to remove temporary upload"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_upload_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().join("uploads")).unwrap();

        let upload = store.stage_bytes(b"not really a png", MediaType::Png).unwrap();
        let path = upload.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));

        drop(upload);
        assert!(!path.exists());
    }

    #[test]
    fn test_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path()).unwrap();
        let first = store.stage_bytes(b"a", MediaType::Jpeg).unwrap();
        let second = store.stage_bytes(b"a", MediaType::Jpeg).unwrap();
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn test_stage_file_copies_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("scan.pdf");
        fs::write(&source, b"%PDF-1.4").unwrap();

        let store = UploadStore::new(dir.path().join("uploads")).unwrap();
        let upload = store.stage_file(&source, MediaType::Pdf).unwrap();
        assert_eq!(fs::read(upload.path()).unwrap(), b"%PDF-1.4");
        assert_eq!(upload.media_type(), MediaType::Pdf);

        drop(upload);
        assert!(source.exists());
    }

    #[test]
    fn test_drop_of_missing_file_is_quiet() {
        let upload = TempUpload::adopt("/nonexistent/marksheet-upload.png", MediaType::Png);
        drop(upload);
    }
}
