//! Timestamped, content-preserving backups of original files
//!
//! Backups are named `<stem>_backup_<YYYYMMDD_HHMMSS><ext>`. The copy is
//! staged in a hidden temporary file in the destination folder and only
//! published (without replacing anything) once content, permissions and
//! modification time are in place. A second backup taken within the same
//! second gets a numeric suffix: `<stem>_backup_<stamp>_1<ext>`.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{ExtractError, Result};

pub const BACKUP_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Upper bound on same-second name collisions before giving up
const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct BackupRecord {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub created_at: DateTime<Local>,
}

/// Back up `original` into `destination` (or next to the original)
pub fn make_backup(original: &Path, destination: Option<&Path>) -> Result<BackupRecord> {
    make_backup_at(original, destination, Local::now())
}

/// Back up `original` using `now` for the file name stamp
pub fn make_backup_at(
    original: &Path,
    destination: Option<&Path>,
    now: DateTime<Local>,
) -> Result<BackupRecord> {
    let metadata = match fs::metadata(original) {
        Ok(m) if m.is_file() => m,
        Ok(_) => return Err(ExtractError::NotFound(original.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ExtractError::NotFound(original.to_path_buf()))
        }
        Err(e) => return Err(ExtractError::io(original, e)),
    };

    let folder = match destination {
        Some(dir) => dir.to_path_buf(),
        None => original
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    fs::create_dir_all(&folder).map_err(|e| ExtractError::io(&folder, e))?;

    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = original
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let base = format!("{}_backup_{}", stem, now.format(BACKUP_STAMP_FORMAT));

    let first_target = folder.join(format!("{}{}", base, extension));
    let staged = stage_copy(original, &folder, &metadata)
        .map_err(|e| ExtractError::io(&first_target, e))?;

    let backup_path = publish(staged, &folder, &base, &extension)?;
    info!("Backup created: {} -> {}", original.display(), backup_path.display());

    Ok(BackupRecord {
        original_path: original.to_path_buf(),
        backup_path,
        created_at: now,
    })
}

/// Copy content, mtime and permissions into a temp file beside the target
fn stage_copy(original: &Path, folder: &Path, metadata: &fs::Metadata) -> io::Result<NamedTempFile> {
    let mut source = File::open(original)?;
    let mut staged = tempfile::Builder::new()
        .prefix(".imagerff-")
        .suffix(".part")
        .tempfile_in(folder)?;

    io::copy(&mut source, staged.as_file_mut())?;

    if let Ok(modified) = metadata.modified() {
        staged.as_file().set_modified(modified)?;
    }
    staged.as_file().set_permissions(metadata.permissions())?;
    staged.as_file().sync_all()?;

    Ok(staged)
}

/// Publish the staged copy under the first free backup name
fn publish(mut staged: NamedTempFile, folder: &Path, base: &str, extension: &str) -> Result<PathBuf> {
    let mut candidate = folder.join(format!("{}{}", base, extension));

    for attempt in 1..=MAX_NAME_ATTEMPTS {
        match staged.persist_noclobber(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!("Backup name taken: {}", candidate.display());
                staged = e.file;
                candidate = folder.join(format!("{}_{}{}", base, attempt, extension));
            }
            Err(e) => return Err(ExtractError::io(candidate, e.error)),
        }
    }

    Err(ExtractError::io(
        candidate,
        io::Error::new(io::ErrorKind::AlreadyExists, "no free backup name"),
    ))
}
