//! imagerff - evidence-preserving image metadata extraction
//!
//! Takes a timestamped backup of an image, decodes the EXIF/TIFF metadata
//! block of the backup, converts GPS tags to signed decimal degrees and
//! appends one record per extraction to a local SQLite store.
//! The original file is only ever read.

pub mod backup;
pub mod error;
pub mod extract;
pub mod gps;
pub mod metadata;
pub mod metrics;
pub mod record;
pub mod store;
pub mod tags;

pub use backup::{make_backup, BackupRecord};
pub use error::{ExtractError, FormatError, MetadataError, Result};
pub use extract::{Extractor, ExtractorConfig, Imported};
pub use gps::Coordinates;
pub use metrics::{Metrics, MetricsSnapshot};
pub use record::{ExtractionRecord, StoredRecord, NOT_AVAILABLE};
pub use store::RecordStore;
pub use tags::{Section, TagDictionary, TagValue};
