//! Append-only dataset files for piano rolls.
//!
//! A dataset is a single binary file plus an advisory JSON sidecar:
//!
//! ```text
//! {store}            little-endian throughout
//! ├── header: magic b"ROLLSET\0", version u32, item count u64
//! ├── record 0: [id u64][payload_len u64][duration f64][filename_len u32]
//! │             filename bytes, then the payload
//! │             (created_at as unix microseconds i64, then roll wire bytes)
//! ├── record 1: ...
//! └── ...
//! {store}.rollidx    JSON index cache; never trusted, always re-verified
//! ```
//!
//! One writer at a time holds an exclusive `flock` on the file; readers
//! take no lock. The item count in the header is bumped only after a
//! record is fully written, so an append cut short by a crash turns up
//! as detectable corruption at the next open, never as a short item.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub mod index;
pub mod item;
mod lock;
mod record;
pub mod store;

pub use index::{DatasetIndex, RecordLocation};
pub use item::DatasetItem;
pub use piano_roll::WireError;
pub use store::{ItemIter, OpenMode, RollStore};

pub type Result<T> = std::result::Result<T, StoreError>;

/// Everything that can go wrong opening, reading, or extending a dataset.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no dataset at {path}")]
    NotFound { path: PathBuf },

    #[error("{path} is corrupt at byte {offset}: {detail}")]
    Corrupt {
        path: PathBuf,
        offset: u64,
        detail: String,
    },

    #[error("item {id} is out of range for a dataset of {len} items")]
    ItemNotFound { id: u64, len: u64 },

    #[error("{path} is held by another writer")]
    Locked { path: PathBuf },

    #[error("dataset handle for {path} is read-only")]
    ReadOnly { path: PathBuf },

    #[error("item {id} carries an unreadable roll payload")]
    BadPayload {
        id: u64,
        #[source]
        source: WireError,
    },

    #[error("source filename of {len} bytes exceeds the record header limit")]
    FilenameTooLong { len: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}
