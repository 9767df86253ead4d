//! Extraction orchestrator
//!
//! Sequences the pipeline for one file at a time:
//!
//! 1. decode the backup's metadata block
//! 2. resolve GPS coordinates (malformed GPS tags degrade to "no coordinates")
//! 3. assemble the record, normalizing missing strings to `"N/A"`
//! 4. append it to the record store
//!
//! ## Example
//!
//! ```rust,no_run
//! use imagerff::{Extractor, ExtractorConfig};
//! use std::path::Path;
//!
//! # fn example() -> imagerff::Result<()> {
//! let mut extractor = Extractor::new(&ExtractorConfig::default())?;
//! let imported = extractor.import(Path::new("DSC_0042.jpg"), None)?;
//! println!("{} -> {:?}", imported.record.filename, imported.record.coordinates);
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backup::{self, BackupRecord};
use crate::error::Result;
use crate::gps::{self, Coordinates};
use crate::metadata;
use crate::metrics::{GpsOutcome, Metrics, Timer};
use crate::record::ExtractionRecord;
use crate::store::RecordStore;
use crate::tags::TagDictionary;

pub const DEFAULT_STORE_FILE: &str = "imagerff.db";

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// SQLite file holding the `image_data` table
    pub store_path: PathBuf,
    /// Folder for backups when a call doesn't name one; `None` = next to the original
    pub backup_dir: Option<PathBuf>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_FILE),
            backup_dir: None,
        }
    }
}

/// Result of [`Extractor::import`]
#[derive(Debug, Clone, Serialize)]
pub struct Imported {
    pub backup: BackupRecord,
    pub record: ExtractionRecord,
}

pub struct Extractor {
    store: RecordStore,
    backup_dir: Option<PathBuf>,
    metrics: Arc<Metrics>,
}

impl Extractor {
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        let store = RecordStore::open(&config.store_path)?;
        Ok(Self {
            store,
            backup_dir: config.backup_dir.clone(),
            metrics: Metrics::new(),
        })
    }

    pub fn with_store(store: RecordStore) -> Self {
        Self {
            store,
            backup_dir: None,
            metrics: Metrics::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Back up `original`; `destination` overrides the configured folder
    pub fn backup(&self, original: &Path, destination: Option<&Path>) -> Result<BackupRecord> {
        let destination = destination.or(self.backup_dir.as_deref());
        let record = backup::make_backup(original, destination)?;
        self.metrics.record_backup();
        Ok(record)
    }

    /// Extract metadata from a backup file and persist one record
    pub fn extract(&mut self, backup_path: &Path) -> Result<ExtractionRecord> {
        let timer = Timer::new();
        let result = self.run_extraction(backup_path);
        let latency = timer.elapsed_ms();
        self.metrics.record_extraction(result.is_ok(), latency);

        if let Err(e) = &result {
            warn!("Extraction failed for {}: {}", backup_path.display(), e);
        }
        result
    }

    /// Back up `original`, then extract from the backup
    pub fn import(&mut self, original: &Path, destination: Option<&Path>) -> Result<Imported> {
        let backup = self.backup(original, destination)?;
        let record = self.extract(&backup.backup_path)?;
        Ok(Imported { backup, record })
    }

    fn run_extraction(&mut self, backup_path: &Path) -> Result<ExtractionRecord> {
        let tags = metadata::decode(backup_path)?;
        let coordinates = self.resolve_coordinates(backup_path, &tags);

        let record = ExtractionRecord::from_tags(backup_path, &tags, coordinates);
        let id = self.store.append(&record)?;

        info!(
            "Stored record {} for {} (make={}, model={}, gps={})",
            id,
            record.filename,
            record.device_make,
            record.device_model,
            record.coordinates.is_some()
        );
        Ok(record)
    }

    fn resolve_coordinates(&self, backup_path: &Path, tags: &TagDictionary) -> Option<Coordinates> {
        match gps::resolve(tags) {
            Ok(Some(coords)) => {
                self.metrics.record_gps(GpsOutcome::Resolved);
                Some(coords)
            }
            Ok(None) => {
                debug!("No GPS coordinates in {}", backup_path.display());
                self.metrics.record_gps(GpsOutcome::Absent);
                None
            }
            Err(e) => {
                warn!("Ignoring GPS data in {}: {}", backup_path.display(), e);
                self.metrics.record_gps(GpsOutcome::Degraded);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use std::fs;
    use tempfile::TempDir;

    fn extractor() -> Extractor {
        Extractor::with_store(RecordStore::open_in_memory().unwrap())
    }

    #[test]
    fn test_extract_missing_backup_persists_nothing() {
        let mut extractor = extractor();
        let err = extractor.extract(Path::new("/nonexistent/a_backup.jpg")).unwrap_err();

        assert!(matches!(err, ExtractError::NotFound(_)));
        assert_eq!(extractor.store().count().unwrap(), 0);
        let snapshot = extractor.metrics().snapshot();
        assert_eq!(snapshot.failed_extractions, 1);
    }

    #[test]
    fn test_extract_non_image_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes_backup_20240101_000000.txt");
        fs::write(&path, "meeting notes").unwrap();

        let mut extractor = extractor();
        let err = extractor.extract(&path).unwrap_err();

        assert!(matches!(err, ExtractError::UnsupportedFormat { .. }));
        assert_eq!(extractor.store().count().unwrap(), 0);
    }

    #[test]
    fn test_import_uses_configured_backup_dir() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("notes.txt");
        fs::write(&original, "not an image").unwrap();
        let backups = dir.path().join("backups");

        let mut extractor = Extractor::new(&ExtractorConfig {
            store_path: dir.path().join("store.db"),
            backup_dir: Some(backups.clone()),
        })
        .unwrap();

        // backup succeeds, extraction rejects the content
        let err = extractor.import(&original, None).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat { .. }));
        assert_eq!(fs::read_dir(&backups).unwrap().count(), 1);
        assert_eq!(extractor.metrics().snapshot().backups_created, 1);
    }

    #[test]
    fn test_default_config() {
        let config = ExtractorConfig::default();
        assert_eq!(config.store_path, PathBuf::from("imagerff.db"));
        assert!(config.backup_dir.is_none());
    }
}
