//! The in-memory record index and its JSON cache sidecar.
//!
//! The index is rebuilt from a linear header-hop scan every time a
//! dataset is opened; the scan is the source of truth. The sidecar only
//! lets external tooling see record offsets without reading the store.
//! When a sidecar is present but disagrees with the scan it is rebuilt
//! and the open handle reports the staleness.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::record::{self, RecordHeader, FILE_HEADER_LEN, RECORD_HEADER_LEN};
use crate::{Result, StoreError};

/// Where one record sits in the file: absolute offset and total length,
/// header included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLocation {
    pub offset: u64,
    pub len: u64,
}

/// Record locations in id order; a record's id is its slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetIndex {
    entries: Vec<RecordLocation>,
}

impl DatasetIndex {
    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<RecordLocation> {
        usize::try_from(id)
            .ok()
            .and_then(|slot| self.entries.get(slot))
            .copied()
    }

    pub fn locations(&self) -> &[RecordLocation] {
        &self.entries
    }

    /// First byte past the last record; where the next append lands.
    pub fn end_offset(&self) -> u64 {
        self.entries
            .last()
            .map_or(FILE_HEADER_LEN, |last| last.offset + last.len)
    }

    pub(crate) fn push(&mut self, location: RecordLocation) {
        self.entries.push(location);
    }

    /// One pass over the file, hopping record headers.
    ///
    /// Validates the file header, id continuity, and that every record
    /// (and nothing else) fits inside the file. Record bodies are not
    /// read here; payloads are validated lazily on fetch.
    pub(crate) fn scan(file: &mut File, path: &Path) -> Result<DatasetIndex> {
        let corrupt = |offset: u64, detail: String| StoreError::Corrupt {
            path: path.to_path_buf(),
            offset,
            detail,
        };

        let file_len = file.metadata()?.len();
        file.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; FILE_HEADER_LEN as usize];
        if let Err(err) = file.read_exact(&mut header) {
            return Err(match err.kind() {
                io::ErrorKind::UnexpectedEof => corrupt(0, "file header truncated".to_string()),
                _ => StoreError::Io(err),
            });
        }
        if &header[..8] != record::FILE_MAGIC {
            return Err(corrupt(0, "bad magic, not a rollset file".to_string()));
        }
        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&header[8..12]);
        let version = u32::from_le_bytes(version_bytes);
        if version != record::FORMAT_VERSION {
            return Err(corrupt(8, format!("unsupported format version {version}")));
        }
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&header[12..20]);
        let item_count = u64::from_le_bytes(count_bytes);

        let mut entries = Vec::new();
        let mut offset = FILE_HEADER_LEN;
        for id in 0..item_count {
            if file_len.saturating_sub(offset) < RECORD_HEADER_LEN {
                return Err(corrupt(offset, format!("record {id} header truncated")));
            }
            let mut header_bytes = [0u8; RECORD_HEADER_LEN as usize];
            file.read_exact(&mut header_bytes)?;
            let header = RecordHeader::parse(&header_bytes);
            if header.id != id {
                return Err(corrupt(
                    offset,
                    format!("record id {} where {id} was expected", header.id),
                ));
            }
            let len = u64::from(header.filename_len)
                .checked_add(header.payload_len)
                .and_then(|body| body.checked_add(RECORD_HEADER_LEN))
                .filter(|&len| offset.checked_add(len).is_some_and(|end| end <= file_len))
                .ok_or_else(|| corrupt(offset, format!("record {id} overruns the file")))?;
            entries.push(RecordLocation { offset, len });
            offset += len;
            file.seek(SeekFrom::Start(offset))?;
        }
        if offset != file_len {
            return Err(corrupt(
                offset,
                format!("{} trailing bytes after the last record", file_len - offset),
            ));
        }
        Ok(DatasetIndex { entries })
    }
}

/// Sidecar path: the store path with `.rollidx` appended.
pub fn cache_path(store_path: &Path) -> PathBuf {
    let mut name = store_path.as_os_str().to_os_string();
    name.push(".rollidx");
    PathBuf::from(name)
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexCache {
    version: u32,
    item_count: u64,
    last_offset: u64,
    entries: Vec<RecordLocation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheStatus {
    /// No sidecar on disk. Not an anomaly.
    Missing,
    /// Sidecar agrees with the fresh scan.
    Fresh,
    /// Sidecar is unreadable or disagrees with the scan.
    Stale,
}

pub(crate) fn check_cache(store_path: &Path, index: &DatasetIndex) -> CacheStatus {
    let path = cache_path(store_path);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return CacheStatus::Missing,
        Err(_) => return CacheStatus::Stale,
    };
    let cache: IndexCache = match serde_json::from_str(&text) {
        Ok(cache) => cache,
        Err(_) => return CacheStatus::Stale,
    };
    let fresh = cache.version == record::FORMAT_VERSION
        && cache.item_count == index.len()
        && cache.last_offset == index.end_offset();
    if fresh {
        CacheStatus::Fresh
    } else {
        CacheStatus::Stale
    }
}

/// Best-effort: a cache that cannot be written is only a lost shortcut.
pub(crate) fn write_cache(store_path: &Path, index: &DatasetIndex) {
    let cache = IndexCache {
        version: record::FORMAT_VERSION,
        item_count: index.len(),
        last_offset: index.end_offset(),
        entries: index.locations().to_vec(),
    };
    let path = cache_path(store_path);
    let written = serde_json::to_string(&cache)
        .map_err(io::Error::other)
        .and_then(|json| std::fs::write(&path, json));
    if let Err(err) = written {
        debug!(path = %path.display(), error = %err, "index cache write failed");
    }
}
