//! JSON sidecar manifest: a list of resources with their metadata.
//!
//! ```json
//! [{"id": "IMG_0001.jpg",
//!   "meta": {"latitude.value": [[41,1],[24,1],[12,1]], "latitude.ref": "N", ...}}]
//! ```

use crate::error::{GeotagError, Result};
use crate::location::Geotag;
use crate::tagger::{MediaResource, MetaValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    #[serde(default)]
    pub meta: BTreeMap<String, MetaValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geotag: Option<Geotag>,
}

impl MediaResource for ManifestEntry {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn meta(&self, attr: &str) -> Option<MetaValue> {
        self.meta.get(attr).cloned()
    }

    fn set_geotag(&mut self, tag: Geotag) {
        self.geotag = Some(tag);
    }
}

pub fn load(path: &Path) -> Result<Vec<ManifestEntry>> {
    let data = fs::read_to_string(path).map_err(|e| GeotagError::Manifest(format!("{}: {}", path.display(), e)))?;
    parse(&data).map_err(|e| GeotagError::Manifest(format!("{}: {}", path.display(), e)))
}

pub fn parse(data: &str) -> Result<Vec<ManifestEntry>> {
    serde_json::from_str(data).map_err(|e| GeotagError::Manifest(e.to_string()))
}

pub fn write<W: Write>(writer: W, entries: &[ManifestEntry]) -> Result<()> {
    serde_json::to_writer_pretty(writer, entries).map_err(|e| GeotagError::Manifest(e.to_string()))
}
