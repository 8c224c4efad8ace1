//! Coordinate cache over a pluggable key→bytes store.
//!
//! Backends are a closed set selected by name (`dbm`, `sled`). An unknown
//! name is rejected before anything is created on disk. Records are stored
//! as JSON bytes; bytes that fail to decode are reported as corruption,
//! never as a miss.

use super::types::{CacheKey, LocationRecord};
use crate::config::StorageConfig;
use crate::error::{GeotagError, Result};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, instrument, warn, Level};

/// The storage backend registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Single-file hash store, loaded into memory and written back on flush.
    Dbm,
    /// Embedded sled database.
    Sled,
}

impl StorageKind {
    pub const ALL: [StorageKind; 2] = [StorageKind::Dbm, StorageKind::Sled];

    pub fn name(self) -> &'static str {
        match self {
            Self::Dbm => "dbm",
            Self::Sled => "sled",
        }
    }

    fn open(self, location: &Path) -> Result<Store> {
        match self {
            Self::Dbm => DbmStore::open(location).map(Store::Dbm),
            Self::Sled => sled::Config::default()
                .path(location)
                .open()
                .map(Store::Sled)
                .map_err(|e| GeotagError::Storage(format!("failed to open {}: {}", location.display(), e))),
        }
    }
}

impl FromStr for StorageKind {
    type Err = GeotagError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| GeotagError::UnsupportedStorage(s.to_string()))
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

enum Store {
    Dbm(DbmStore),
    Sled(sled::Db),
}

impl Store {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self {
            Self::Dbm(db) => Ok(db.entries.get(key).cloned()),
            Self::Sled(db) => Ok(db.get(key)?.map(|v| v.to_vec())),
        }
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        match self {
            Self::Dbm(db) => {
                db.entries.insert(key.to_string(), value);
                db.dirty = true;
                Ok(())
            }
            Self::Sled(db) => {
                db.insert(key, value)?;
                Ok(())
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Dbm(db) => db.entries.len(),
            Self::Sled(db) => db.len(),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self {
            Self::Dbm(db) => db.flush(),
            Self::Sled(db) => db.flush().map(|_| ()).map_err(GeotagError::from),
        }
    }
}

struct DbmStore {
    path: PathBuf,
    entries: HashMap<String, Vec<u8>>,
    dirty: bool,
}

impl DbmStore {
    fn open(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let file = File::open(path)?;
            ciborium::from_reader(BufReader::new(file))
                .map_err(|e| GeotagError::Storage(format!("failed to read {}: {}", path.display(), e)))?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries,
            dirty: false,
        })
    }

    /// Write the whole map to a sibling temp file, then rename over the store.
    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let tmp = self.path.with_extension("tmp");
        let mut writer = BufWriter::new(File::create(&tmp)?);
        ciborium::into_writer(&self.entries, &mut writer)
            .map_err(|e| GeotagError::Storage(format!("failed to write {}: {}", tmp.display(), e)))?;
        writer.flush()?;
        drop(writer);
        fs::rename(&tmp, &self.path)?;

        self.dirty = false;
        Ok(())
    }
}

/// An open cache handle, held for the duration of one batch.
///
/// `close` flushes and surfaces errors; dropping an unclosed handle flushes
/// best-effort so the store is released on every exit path.
pub struct CoordinateCache {
    kind: StorageKind,
    location: PathBuf,
    store: Store,
    closed: bool,
}

impl CoordinateCache {
    #[instrument(level = Level::INFO, err)]
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let kind: StorageKind = config.backend.parse()?;

        fs::create_dir_all(&config.path)?;
        let location = config.location();
        let store = kind.open(&location)?;

        debug!("Opened {} cache at {}", kind, location.display());
        Ok(Self {
            kind,
            location,
            store,
            closed: false,
        })
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        self.store.get(key.as_str())
    }

    pub fn put(&mut self, key: &CacheKey, value: Vec<u8>) -> Result<()> {
        self.store.put(key.as_str(), value)
    }

    /// Look up and decode a record. Undecodable bytes are `CacheCorruption`.
    pub fn get_record(&self, key: &CacheKey) -> Result<Option<LocationRecord>> {
        match self.get(key)? {
            Some(bytes) => decode_record(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn put_record(&mut self, key: &CacheKey, record: &LocationRecord) -> Result<()> {
        self.put(key, encode_record(record)?)
    }

    pub fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Number of entries (for testing and the batch summary).
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }

    #[instrument(level = Level::INFO, skip(self), fields(kind = %self.kind, location = %self.location.display()), err)]
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.store.flush()
    }
}

impl Drop for CoordinateCache {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.store.flush() {
            warn!("Failed to flush {} cache at {}: {}", self.kind, self.location.display(), e);
        }
    }
}

pub fn encode_record(record: &LocationRecord) -> Result<Vec<u8>> {
    serde_json::to_vec(record).map_err(|e| GeotagError::Storage(e.to_string()))
}

pub fn decode_record(key: &CacheKey, bytes: &[u8]) -> Result<LocationRecord> {
    serde_json::from_slice(bytes).map_err(|e| GeotagError::CacheCorruption {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::super::types::Coordinate;
    use super::*;
    use tempfile::TempDir;

    fn storage(dir: &TempDir, backend: &str) -> StorageConfig {
        StorageConfig {
            backend: backend.into(),
            path: dir.path().join("cache"),
            name: "geotag.db".into(),
        }
    }

    fn barcelona() -> LocationRecord {
        LocationRecord {
            country_code: Some("ES".into()),
            country: Some("Spain".into()),
            city: Some("Barcelona".into()),
            address: Some("Carrer de Mallorca".into()),
            address_number: Some("401".into()),
        }
    }

    fn key() -> CacheKey {
        CacheKey::quantize(Coordinate::new(41.403333, 2.174403), 6)
    }

    #[test]
    fn test_storage_kind_registry() {
        assert_eq!("dbm".parse::<StorageKind>().unwrap(), StorageKind::Dbm);
        assert_eq!("sled".parse::<StorageKind>().unwrap(), StorageKind::Sled);
        let err = "xyz".parse::<StorageKind>().unwrap_err();
        assert!(matches!(err, GeotagError::UnsupportedStorage(ref name) if name == "xyz"));
    }

    #[test]
    fn test_unsupported_storage_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let config = storage(&dir, "xyz");
        assert!(matches!(CoordinateCache::open(&config), Err(GeotagError::UnsupportedStorage(_))));
        assert!(!config.path.exists());
    }

    #[test]
    fn test_record_round_trip_both_backends() {
        for kind in StorageKind::ALL {
            let dir = TempDir::new().unwrap();
            let mut cache = CoordinateCache::open(&storage(&dir, kind.name())).unwrap();
            assert_eq!(cache.kind(), kind);

            cache.put_record(&key(), &barcelona()).unwrap();
            assert_eq!(cache.get_record(&key()).unwrap(), Some(barcelona()));
            cache.close().unwrap();
        }
    }

    #[test]
    fn test_sparse_record_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut cache = CoordinateCache::open(&storage(&dir, "dbm")).unwrap();
        let sparse = LocationRecord {
            country: Some("Antarctica".into()),
            ..Default::default()
        };
        cache.put_record(&key(), &sparse).unwrap();
        assert_eq!(cache.get_record(&key()).unwrap(), Some(sparse));
    }

    #[test]
    fn test_miss() {
        for kind in StorageKind::ALL {
            let dir = TempDir::new().unwrap();
            let cache = CoordinateCache::open(&storage(&dir, kind.name())).unwrap();
            assert_eq!(cache.get_record(&key()).unwrap(), None);
            assert!(!cache.contains(&key()).unwrap());
            assert!(cache.is_empty());
        }
    }

    #[test]
    fn test_persistence_across_close() {
        for kind in StorageKind::ALL {
            let dir = TempDir::new().unwrap();
            let config = storage(&dir, kind.name());

            {
                let mut cache = CoordinateCache::open(&config).unwrap();
                cache.put_record(&key(), &barcelona()).unwrap();
                cache.close().unwrap();
            }

            let cache = CoordinateCache::open(&config).unwrap();
            assert_eq!(cache.len(), 1);
            assert_eq!(cache.get_record(&key()).unwrap(), Some(barcelona()));
        }
    }

    #[test]
    fn test_drop_flushes_dbm() {
        let dir = TempDir::new().unwrap();
        let config = storage(&dir, "dbm");

        {
            let mut cache = CoordinateCache::open(&config).unwrap();
            cache.put_record(&key(), &barcelona()).unwrap();
            // dropped without close
        }

        let cache = CoordinateCache::open(&config).unwrap();
        assert_eq!(cache.get_record(&key()).unwrap(), Some(barcelona()));
    }

    #[test]
    fn test_corrupt_entry_is_not_a_miss() {
        for kind in StorageKind::ALL {
            let dir = TempDir::new().unwrap();
            let mut cache = CoordinateCache::open(&storage(&dir, kind.name())).unwrap();
            cache.put(&key(), b"\x80\x02garbage".to_vec()).unwrap();

            let err = cache.get_record(&key()).unwrap_err();
            assert!(matches!(err, GeotagError::CacheCorruption { ref key, .. } if key == "41.403333,2.174403"));
        }
    }

    #[test]
    fn test_unreadable_dbm_file() {
        let dir = TempDir::new().unwrap();
        let config = storage(&dir, "dbm");
        fs::create_dir_all(&config.path).unwrap();
        fs::write(config.location(), b"definitely not cbor \xff\xff").unwrap();

        assert!(matches!(CoordinateCache::open(&config), Err(GeotagError::Storage(_))));
    }

    #[test]
    fn test_encode_decode() {
        let bytes = encode_record(&barcelona()).unwrap();
        assert_eq!(decode_record(&key(), &bytes).unwrap(), barcelona());
    }
}
