//! Extraction records handed to callers and persisted by the store

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::path::Path;

use crate::gps::Coordinates;
use crate::tags::{tag, Section, TagDictionary};

/// Placeholder for unknown string fields
pub const NOT_AVAILABLE: &str = "N/A";

/// Metadata extracted from one backup file.
///
/// Coordinates are kept as a single optional pair so latitude and
/// longitude are always both present or both absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRecord {
    pub filename: String,
    pub backup_path: String,
    pub capture_timestamp: String,
    pub device_make: String,
    pub device_model: String,
    pub coordinates: Option<Coordinates>,
}

impl ExtractionRecord {
    /// Assemble a record from decoded tags, substituting `"N/A"` for
    /// missing or empty strings
    pub fn from_tags(backup_path: &Path, tags: &TagDictionary, coordinates: Option<Coordinates>) -> Self {
        let filename = backup_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            filename,
            backup_path: backup_path.to_string_lossy().into_owned(),
            capture_timestamp: or_not_available(tags.text(Section::Primary, tag::DATE_TIME)),
            device_make: or_not_available(tags.text(Section::Primary, tag::MAKE)),
            device_model: or_not_available(tags.text(Section::Primary, tag::MODEL)),
            coordinates,
        }
    }

    pub fn latitude(&self) -> Option<f64> {
        self.coordinates.map(|c| c.latitude)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.coordinates.map(|c| c.longitude)
    }
}

pub fn or_not_available(value: Option<String>) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => NOT_AVAILABLE.to_string(),
    }
}

// Flat shape: latitude/longitude are separate (nullable) fields
impl Serialize for ExtractionRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ExtractionRecord", 7)?;
        s.serialize_field("filename", &self.filename)?;
        s.serialize_field("backup_path", &self.backup_path)?;
        s.serialize_field("capture_timestamp", &self.capture_timestamp)?;
        s.serialize_field("device_make", &self.device_make)?;
        s.serialize_field("device_model", &self.device_model)?;
        s.serialize_field("latitude", &self.latitude())?;
        s.serialize_field("longitude", &self.longitude())?;
        s.end()
    }
}

/// A record as read back from the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub id: i64,
    #[serde(flatten)]
    pub record: ExtractionRecord,
}
