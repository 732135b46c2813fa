use anyhow::{Context, Result};
use log::{info, warn};
use path_clean::PathClean;
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use uuid::Uuid;

use crate::common::MAX_DELETE_ATTEMPTS;
use crate::common::errors::ServiceError;

/// Raw byte storage addressed by path.
pub trait FileStore: Send + Sync + 'static {
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    /// Removing a file that does not exist is not an error.
    fn delete(&self, path: &Path) -> Result<()>;

    fn size_of(&self, path: &Path) -> Result<u64>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileStore;

impl FileStore for LocalFileStore {
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        write_atomically(path, bytes)?;
        info!("File saved: {:?}", path);
        Ok(())
    }

    fn delete(&self, path: &Path) -> Result<()> {
        info!("Delete file: {:?}", path);
        let mut attempts = 0;
        loop {
            attempts += 1;
            match fs::remove_file(path) {
                Ok(_) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    info!("File for delete not found: {:?}", path);
                    return Ok(());
                }
                Err(err) if attempts < MAX_DELETE_ATTEMPTS => {
                    warn!(
                        "Failed deleting {:?} (attempt {}), retrying in {}ms: {}",
                        path,
                        attempts,
                        100 * attempts,
                        err
                    );
                    thread::sleep(Duration::from_millis(100 * attempts));
                }
                Err(err) => {
                    return Err(err).context(format!(
                        "Failed deleting {:?} after {} attempts",
                        path, attempts
                    ));
                }
            }
        }
    }

    fn size_of(&self, path: &Path) -> Result<u64> {
        let metadata =
            fs::metadata(path).with_context(|| format!("Failed to stat file {:?}", path))?;
        Ok(metadata.len())
    }
}

/// Write into a sibling temp file and rename it over `path`, so readers see
/// either the old bytes or the new ones.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Path has no file name: {:?}", path))?;
    let path_tmp = path.with_file_name(format!(".{}-{}.tmp", file_name, Uuid::new_v4()));

    fs::write(&path_tmp, bytes)
        .with_context(|| format!("Failed to write temp file {:?}", path_tmp))?;
    if let Err(err) = fs::rename(&path_tmp, path) {
        let _ = fs::remove_file(&path_tmp);
        return Err(err).context(format!("Failed to move {:?} to {:?}", path_tmp, path));
    }
    Ok(())
}

/// Map an uploaded filename onto its storage location. Only the last path
/// component of the client-supplied name is kept.
pub fn storage_path(upload_dir: &Path, filename: &str) -> Result<PathBuf, ServiceError> {
    let basename = filename.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if basename.is_empty() || basename == "." || basename == ".." || basename.contains('\0') {
        return Err(ServiceError::InvalidFilename(filename.to_string()));
    }
    Ok(upload_dir.join(basename).clean())
}
