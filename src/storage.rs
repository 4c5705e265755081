//! Working directories and the files that live in them
//!
//! Uploaded images are owned by a [`TemporaryImage`] guard for the duration of
//! one request and removed when it is cleaned up or dropped. Generated
//! documents stay in the output directory.

use crate::error::ConvertError;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Longest sanitized original name kept in a temporary filename
const MAX_NAME_LEN: usize = 100;

/// Filesystem layout for one server instance
#[derive(Debug, Clone)]
pub struct Storage {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

/// An uploaded image on disk, removed on [`TemporaryImage::cleanup`] or drop
#[derive(Debug)]
pub struct TemporaryImage {
    path: TempPath,
}

impl TemporaryImage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file. Failures are logged and swallowed.
    pub fn cleanup(self) {
        let path = self.path.to_path_buf();
        match self.path.close() {
            Ok(()) => tracing::debug!("Removed temporary image {:?}", path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove temporary image {:?}: {}", path, e),
        }
    }
}

impl Storage {
    /// Create the working directories if they do not exist yet
    pub fn new(upload_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let storage = Self {
            upload_dir: upload_dir.into(),
            output_dir: output_dir.into(),
        };
        ensure_dir(&storage.upload_dir)?;
        ensure_dir(&storage.output_dir)?;
        Ok(storage)
    }

    /// Write upload bytes to a uniquely named file in the upload directory
    pub fn persist_upload(
        &self,
        data: &[u8],
        original_name: &str,
    ) -> Result<TemporaryImage, ConvertError> {
        // Another request or an operator may have removed the directory.
        ensure_dir(&self.upload_dir).map_err(|e| storage_failure("create upload directory", e))?;

        let suffix = format!("_{}", sanitize_file_name(original_name));
        let mut file = tempfile::Builder::new()
            .prefix("upload_")
            .suffix(&suffix)
            .tempfile_in(&self.upload_dir)
            .map_err(|e| storage_failure("create temporary file", e))?;

        file.write_all(data)
            .and_then(|_| file.flush())
            .map_err(|e| storage_failure("save uploaded file", e))?;

        let path = file.into_temp_path();
        tracing::debug!("Stored upload ({} bytes) at {:?}", data.len(), &*path);

        Ok(TemporaryImage { path })
    }

    /// Write a generated document. Never overwrites an existing file.
    pub fn write_output(&self, filename: &str, data: &[u8]) -> Result<PathBuf, ConvertError> {
        ensure_dir(&self.output_dir).map_err(|e| storage_failure("create output directory", e))?;

        let path = self.output_dir.join(filename);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| storage_failure("create output file", e))?;

        if let Err(e) = file.write_all(data).and_then(|_| file.sync_all()) {
            drop(file);
            remove_quietly(&path);
            return Err(storage_failure("save output file", e));
        }

        Ok(path)
    }
}

/// Best-effort removal; a missing file counts as removed
pub fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {:?}: {}", path, e),
    }
}

/// Keep `[A-Za-z0-9._-]`, replace everything else
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();

    if sanitized.trim_matches('.').is_empty() {
        "image".to_string()
    } else {
        sanitized
    }
}

fn ensure_dir(path: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    // Recursive creation tolerates directories that already exist, including
    // ones created concurrently by another request.
    builder.create(path)
}

fn storage_failure(action: &str, e: io::Error) -> ConvertError {
    tracing::error!("Failed to {}: {}", action, e);
    ConvertError::Storage(format!("Failed to {}", action))
}
