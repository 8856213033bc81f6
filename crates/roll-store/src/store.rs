//! The dataset handle: open, append, fetch, iterate, compact.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use crate::index::{self, CacheStatus, DatasetIndex, RecordLocation};
use crate::lock;
use crate::record::{self, COUNT_OFFSET};
use crate::{DatasetItem, Result, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing dataset, fetch only.
    Read,
    /// Create or truncate, then write.
    Write,
    /// Existing dataset, extend in place.
    Append,
}

/// Handle on one dataset file.
///
/// Write and append handles hold an exclusive advisory lock for their
/// lifetime; there is one writer per dataset at a time. Readers take no
/// lock. Fetching goes through a mutex-guarded handle, so a store
/// behind an `Arc` serves `get` from several threads at once, and every
/// [`RollStore::load_all`] pass owns its own file handle.
#[derive(Debug)]
pub struct RollStore {
    path: PathBuf,
    index: DatasetIndex,
    reader: Mutex<File>,
    writer: Option<File>,
    stale_cache: bool,
    finished: bool,
}

impl RollStore {
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<RollStore> {
        let path = path.as_ref().to_path_buf();
        match mode {
            OpenMode::Read => {
                let mut file = open_existing(&path)?;
                let index = DatasetIndex::scan(&mut file, &path)?;
                let stale_cache = refresh_cache(&path, &index);
                Ok(RollStore {
                    path,
                    index,
                    reader: Mutex::new(file),
                    writer: None,
                    stale_cache,
                    finished: false,
                })
            }
            OpenMode::Append => {
                let mut writer = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&path)
                    .map_err(|err| map_open(err, &path))?;
                if !lock::try_exclusive(&writer)? {
                    return Err(StoreError::Locked { path });
                }
                let index = DatasetIndex::scan(&mut writer, &path)?;
                let stale_cache = refresh_cache(&path, &index);
                let reader = open_existing(&path)?;
                Ok(RollStore {
                    path,
                    index,
                    reader: Mutex::new(reader),
                    writer: Some(writer),
                    stale_cache,
                    finished: false,
                })
            }
            OpenMode::Write => {
                let mut writer = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .open(&path)?;
                if !lock::try_exclusive(&writer)? {
                    return Err(StoreError::Locked { path });
                }
                // Truncate only once the lock is ours, so a losing
                // opener cannot wipe the winner's data.
                writer.set_len(0)?;
                writer.seek(SeekFrom::Start(0))?;
                writer.write_all(&record::file_header(0))?;
                writer.flush()?;
                let reader = open_existing(&path)?;
                Ok(RollStore {
                    path,
                    index: DatasetIndex::default(),
                    reader: Mutex::new(reader),
                    writer: Some(writer),
                    stale_cache: false,
                    finished: false,
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// True when this open found an index cache sidecar that disagreed
    /// with the fresh scan and had to rebuild it.
    pub fn stale_cache_detected(&self) -> bool {
        self.stale_cache
    }

    /// Append one item, returning its id. Ids are sequential from zero.
    ///
    /// The record body is written and flushed before the header's item
    /// count is bumped; an append cut short by a crash is detected as
    /// corruption at the next open instead of being read as a short
    /// item.
    pub fn append(&mut self, item: &DatasetItem) -> Result<u64> {
        let writer = self.writer.as_mut().ok_or_else(|| StoreError::ReadOnly {
            path: self.path.clone(),
        })?;
        let id = self.index.len();
        let bytes = record::encode_record(id, item)?;
        let offset = self.index.end_offset();

        writer.seek(SeekFrom::Start(offset))?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        writer.seek(SeekFrom::Start(COUNT_OFFSET))?;
        writer.write_all(&(id + 1).to_le_bytes())?;
        writer.flush()?;

        self.index.push(RecordLocation {
            offset,
            len: bytes.len() as u64,
        });
        Ok(id)
    }

    /// Fetch one item by id.
    pub fn get(&self, id: u64) -> Result<DatasetItem> {
        let location = self.index.get(id).ok_or(StoreError::ItemNotFound {
            id,
            len: self.index.len(),
        })?;
        let mut buf = vec![0u8; location.len as usize];
        {
            let mut reader = self
                .reader
                .lock()
                .map_err(|_| StoreError::Io(io::Error::other("dataset reader poisoned")))?;
            reader.seek(SeekFrom::Start(location.offset))?;
            reader.read_exact(&mut buf)?;
        }
        record::decode_record(id, &buf, &self.path, location.offset)
    }

    /// Iterate every item in id order.
    ///
    /// The iterator owns a fresh file handle: calling `load_all` again
    /// restarts from item zero, and concurrent passes do not disturb
    /// each other or `get`.
    pub fn load_all(&self) -> Result<ItemIter> {
        let file = open_existing(&self.path)?;
        Ok(ItemIter {
            file,
            path: self.path.clone(),
            locations: self.index.locations().to_vec(),
            next: 0,
        })
    }

    /// Rewrite the dataset into a new store at `dst`, keeping the items
    /// `keep` approves and re-assigning ids 0..K in survivor order.
    ///
    /// Returns the open write handle on the new store.
    pub fn compact_into<P, F>(&self, dst: P, mut keep: F) -> Result<RollStore>
    where
        P: AsRef<Path>,
        F: FnMut(u64, &DatasetItem) -> bool,
    {
        let mut out = RollStore::open(dst, OpenMode::Write)?;
        for (id, item) in self.load_all()?.enumerate() {
            let item = item?;
            if keep(id as u64, &item) {
                out.append(&item)?;
            }
        }
        Ok(out)
    }

    /// Flush to disk, persist the index cache, and release the writer
    /// lock. Dropping the handle does the same best-effort; `close`
    /// exists so callers see the errors.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if let Some(writer) = self.writer.take() {
            writer.sync_all()?;
            index::write_cache(&self.path, &self.index);
            lock::release(&writer);
        }
        Ok(())
    }
}

impl Drop for RollStore {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

/// Lazy pass over a dataset, yielding items in id order.
#[derive(Debug)]
pub struct ItemIter {
    file: File,
    path: PathBuf,
    locations: Vec<RecordLocation>,
    next: usize,
}

impl ItemIter {
    fn read_one(&mut self, id: u64, location: RecordLocation) -> Result<DatasetItem> {
        let mut buf = vec![0u8; location.len as usize];
        self.file.seek(SeekFrom::Start(location.offset))?;
        self.file.read_exact(&mut buf)?;
        record::decode_record(id, &buf, &self.path, location.offset)
    }
}

impl Iterator for ItemIter {
    type Item = Result<DatasetItem>;

    fn next(&mut self) -> Option<Self::Item> {
        let location = *self.locations.get(self.next)?;
        let id = self.next as u64;
        self.next += 1;
        Some(self.read_one(id, location))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.locations.len() - self.next;
        (remaining, Some(remaining))
    }
}

fn open_existing(path: &Path) -> Result<File> {
    File::open(path).map_err(|err| map_open(err, path))
}

fn map_open(err: io::Error, path: &Path) -> StoreError {
    match err.kind() {
        io::ErrorKind::NotFound => StoreError::NotFound {
            path: path.to_path_buf(),
        },
        _ => StoreError::Io(err),
    }
}

fn refresh_cache(path: &Path, index: &DatasetIndex) -> bool {
    match index::check_cache(path, index) {
        CacheStatus::Stale => {
            warn!(
                path = %path.display(),
                "index cache disagrees with the dataset; rebuilt from a fresh scan"
            );
            index::write_cache(path, index);
            true
        }
        CacheStatus::Missing | CacheStatus::Fresh => false,
    }
}
