use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ExtractError, Result};
use crate::gps::Coordinates;
use crate::record::{ExtractionRecord, StoredRecord};

const MEMORY_PATH: &str = ":memory:";

/// Append-only SQLite store of extraction records.
///
/// One row per extraction in the `image_data` table. Rows are never updated
/// or deleted; ids increase with insertion order (`AUTOINCREMENT` never
/// reuses ids). A store handle is not meant to be shared by concurrent
/// writers.
pub struct RecordStore {
    conn: Connection,
    path: PathBuf,
}

impl RecordStore {
    /// Open (or create) the store file and make sure the schema exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ExtractError::io(parent, e))?;
        }

        let conn = Connection::open(&path).map_err(|e| ExtractError::store(&path, e))?;
        let store = Self { conn, path };
        store.ensure_schema()?;

        info!("Record store opened at {}", store.path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| ExtractError::store(MEMORY_PATH, e))?;
        let store = Self {
            conn,
            path: PathBuf::from(MEMORY_PATH),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Create the `image_data` table if absent. Safe to call repeatedly.
    pub fn ensure_schema(&self) -> Result<()> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS image_data (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    filename    TEXT,
                    backup      TEXT,
                    datatime    TEXT,
                    make        TEXT,
                    model       TEXT,
                    latitude    REAL,
                    longitude   REAL
                )",
                [],
            )
            .map_err(|e| self.error(e))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert one row and commit before returning its id
    pub fn append(&mut self, record: &ExtractionRecord) -> Result<i64> {
        let path = &self.path;
        let fail = |e| ExtractError::store(path, e);

        let tx = self.conn.transaction().map_err(fail)?;
        tx.execute(
            "INSERT INTO image_data (filename, backup, datatime, make, model, latitude, longitude)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.filename,
                record.backup_path,
                record.capture_timestamp,
                record.device_make,
                record.device_model,
                record.latitude(),
                record.longitude(),
            ],
        )
        .map_err(fail)?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(fail)?;

        debug!("Appended record {} for {}", id, record.filename);
        Ok(id)
    }

    pub fn count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM image_data", [], |row| row.get(0))
            .map_err(|e| self.error(e))
    }

    pub fn get(&self, id: i64) -> Result<Option<StoredRecord>> {
        let result = self.conn.query_row(
            "SELECT id, filename, backup, datatime, make, model, latitude, longitude
             FROM image_data WHERE id = ?1",
            [id],
            stored_record_from_row,
        );
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(self.error(e)),
        }
    }

    /// Most recent records first
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, filename, backup, datatime, make, model, latitude, longitude
                 FROM image_data ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| self.error(e))?;

        let rows = stmt
            .query_map([limit as i64], stored_record_from_row)
            .map_err(|e| self.error(e))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| self.error(e))?);
        }
        Ok(records)
    }

    fn error(&self, source: rusqlite::Error) -> ExtractError {
        ExtractError::store(&self.path, source)
    }
}

fn stored_record_from_row(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    let latitude: Option<f64> = row.get(6)?;
    let longitude: Option<f64> = row.get(7)?;

    Ok(StoredRecord {
        id: row.get(0)?,
        record: ExtractionRecord {
            filename: row.get(1)?,
            backup_path: row.get(2)?,
            capture_timestamp: row.get(3)?,
            device_make: row.get(4)?,
            device_model: row.get(5)?,
            coordinates: match (latitude, longitude) {
                (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
                _ => None,
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::NOT_AVAILABLE;
    use tempfile::TempDir;

    fn record(name: &str, coordinates: Option<Coordinates>) -> ExtractionRecord {
        ExtractionRecord {
            filename: name.to_string(),
            backup_path: format!("/backups/{}", name),
            capture_timestamp: "2023:07:14 09:30:00".to_string(),
            device_make: "Apple".to_string(),
            device_model: NOT_AVAILABLE.to_string(),
            coordinates,
        }
    }

    fn table_count(store: &RecordStore) -> i64 {
        store
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'image_data'",
                [],
                |row| row.get(0),
            )
            .unwrap()
    }

    #[test]
    fn test_ensure_schema_idempotent() {
        let mut store = RecordStore::open_in_memory().unwrap();
        store.append(&record("a.jpg", None)).unwrap();

        store.ensure_schema().unwrap();
        store.ensure_schema().unwrap();

        assert_eq!(table_count(&store), 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_append_ids_increase_and_round_trip() {
        let mut store = RecordStore::open_in_memory().unwrap();
        let inputs = vec![
            record("a.jpg", Some(Coordinates { latitude: 40.446111, longitude: -79.982222 })),
            record("b.jpg", None),
            record("c.jpg", Some(Coordinates { latitude: -33.8, longitude: 151.2 })),
        ];

        let ids: Vec<i64> = inputs.iter().map(|r| store.append(r).unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(store.count().unwrap(), 3);

        for (id, input) in ids.iter().zip(&inputs) {
            let stored = store.get(*id).unwrap().unwrap();
            assert_eq!(stored.id, *id);
            assert_eq!(&stored.record, input);
        }
    }

    #[test]
    fn test_missing_coordinates_stored_as_null() {
        let mut store = RecordStore::open_in_memory().unwrap();
        let id = store.append(&record("b.jpg", None)).unwrap();

        let (lat_null, lon_null): (bool, bool) = store
            .conn
            .query_row(
                "SELECT latitude IS NULL, longitude IS NULL FROM image_data WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert!(lat_null && lon_null);
    }

    #[test]
    fn test_recent_newest_first() {
        let mut store = RecordStore::open_in_memory().unwrap();
        for name in ["1.jpg", "2.jpg", "3.jpg"] {
            store.append(&record(name, None)).unwrap();
        }

        let recent = store.recent(2).unwrap();
        let names: Vec<&str> = recent.iter().map(|r| r.record.filename.as_str()).collect();
        assert_eq!(names, vec!["3.jpg", "2.jpg"]);
    }

    #[test]
    fn test_get_unknown_id() {
        let store = RecordStore::open_in_memory().unwrap();
        assert!(store.get(42).unwrap().is_none());
    }

    #[test]
    fn test_store_errors_name_the_store_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("imagerff.db");
        let mut store = RecordStore::open(&path).unwrap();

        let other = Connection::open(&path).unwrap();
        other.execute("DROP TABLE image_data", []).unwrap();

        let err = store.append(&record("a.jpg", None)).unwrap_err();
        match &err {
            ExtractError::Store { path: reported, .. } => assert_eq!(reported, &path),
            other => panic!("expected store error, got {:?}", other),
        }
        assert!(err.to_string().contains(&path.display().to_string()));
        assert!(matches!(store.count(), Err(ExtractError::Store { .. })));
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("imagerff.db");

        {
            let mut store = RecordStore::open(&path).unwrap();
            store.append(&record("a.jpg", None)).unwrap();
            store.append(&record("b.jpg", None)).unwrap();
        }

        let mut store = RecordStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 2);
        let id = store.append(&record("c.jpg", None)).unwrap();
        assert_eq!(id, 3);
        assert_eq!(store.path(), path.as_path());
    }
}
