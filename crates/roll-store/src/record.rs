//! Fixed-width record and file-header codecs.

use std::path::Path;

use chrono::DateTime;
use piano_roll::PianoRoll;

use crate::{DatasetItem, Result, StoreError};

pub(crate) const FILE_MAGIC: &[u8; 8] = b"ROLLSET\0";
pub(crate) const FORMAT_VERSION: u32 = 1;
pub(crate) const FILE_HEADER_LEN: u64 = 20;
pub(crate) const RECORD_HEADER_LEN: u64 = 28;
/// Byte offset of the item count within the file header.
pub(crate) const COUNT_OFFSET: u64 = 12;

pub(crate) fn file_header(item_count: u64) -> [u8; FILE_HEADER_LEN as usize] {
    let mut out = [0u8; FILE_HEADER_LEN as usize];
    out[..8].copy_from_slice(FILE_MAGIC);
    out[8..12].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    out[12..20].copy_from_slice(&item_count.to_le_bytes());
    out
}

/// The four fixed-width fields in front of every record body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RecordHeader {
    pub(crate) id: u64,
    pub(crate) payload_len: u64,
    pub(crate) duration: f64,
    pub(crate) filename_len: u32,
}

impl RecordHeader {
    pub(crate) fn parse(bytes: &[u8; RECORD_HEADER_LEN as usize]) -> Self {
        Self {
            id: u64::from_le_bytes(field(bytes, 0)),
            payload_len: u64::from_le_bytes(field(bytes, 8)),
            duration: f64::from_le_bytes(field(bytes, 16)),
            filename_len: u32::from_le_bytes(field(bytes, 24)),
        }
    }
}

fn field<const N: usize>(bytes: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[at..at + N]);
    out
}

pub(crate) fn encode_record(id: u64, item: &DatasetItem) -> Result<Vec<u8>> {
    let filename = item.source_filename.as_bytes();
    let filename_len = u32::try_from(filename.len())
        .map_err(|_| StoreError::FilenameTooLong {
            len: filename.len(),
        })?;
    let roll_bytes = item.roll.to_bytes();
    let payload_len = 8 + roll_bytes.len() as u64;

    let mut out =
        Vec::with_capacity(RECORD_HEADER_LEN as usize + filename.len() + 8 + roll_bytes.len());
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&payload_len.to_le_bytes());
    out.extend_from_slice(&item.duration_seconds.to_le_bytes());
    out.extend_from_slice(&filename_len.to_le_bytes());
    out.extend_from_slice(filename);
    out.extend_from_slice(&item.created_at.timestamp_micros().to_le_bytes());
    out.extend_from_slice(&roll_bytes);
    Ok(out)
}

/// Decode one complete record as read back from `offset` in `path`.
pub(crate) fn decode_record(
    id: u64,
    bytes: &[u8],
    path: &Path,
    offset: u64,
) -> Result<DatasetItem> {
    let corrupt = |detail: String| StoreError::Corrupt {
        path: path.to_path_buf(),
        offset,
        detail,
    };

    if bytes.len() < RECORD_HEADER_LEN as usize {
        return Err(corrupt("record header truncated".to_string()));
    }
    let header = RecordHeader::parse(&field(bytes, 0));
    if header.id != id {
        return Err(corrupt(format!(
            "record id {} where {id} was expected",
            header.id
        )));
    }
    let filename_end = RECORD_HEADER_LEN as usize + header.filename_len as usize;
    let expected = filename_end + header.payload_len as usize;
    if bytes.len() != expected {
        return Err(corrupt(format!(
            "record body is {} bytes where {expected} were declared",
            bytes.len()
        )));
    }

    let filename = std::str::from_utf8(&bytes[RECORD_HEADER_LEN as usize..filename_end])
        .map_err(|_| corrupt("source filename is not UTF-8".to_string()))?
        .to_string();

    let payload = &bytes[filename_end..];
    if payload.len() < 8 {
        return Err(corrupt("payload too short for a timestamp".to_string()));
    }
    let micros = i64::from_le_bytes(field(payload, 0));
    let created_at = DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| corrupt(format!("creation timestamp {micros} out of range")))?;
    let roll =
        PianoRoll::from_bytes(&payload[8..]).map_err(|source| StoreError::BadPayload { id, source })?;

    Ok(DatasetItem {
        roll,
        source_filename: filename,
        duration_seconds: header.duration,
        created_at,
    })
}
