//! Standard MIDI File (SMF) decoding and encoding.
//!
//! The decoder flattens every track of a file onto one shared tick
//! timeline, producing an [`EventStream`] of note, tempo, and sustain
//! pedal events sorted by `(tick, track)`. The encoder renders a stream
//! back to a format 1 file.
//!
//! - [`event`]: the event model shared by both directions
//! - [`decode`]: chunk and track parsing, running status, track merging
//! - [`encode`]: rendering a stream to SMF bytes
//! - [`tempo`]: piecewise-constant tick-to-seconds conversion

use thiserror::Error;

pub mod decode;
pub mod encode;
pub mod event;
pub mod tempo;

pub use decode::decode;
pub use encode::encode;
pub use event::{EventKind, EventStream, MusicEvent, DEFAULT_US_PER_BEAT};
pub use tempo::TempoMap;

/// Why a byte sequence could not be decoded as a MIDI file.
///
/// Offsets are absolute byte positions in the input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("not a standard MIDI file: no MThd header")]
    NotMidi,
    #[error("{chunk} chunk at byte {offset} declares {declared} bytes but only {available} remain")]
    ChunkOverrun {
        chunk: String,
        offset: usize,
        declared: u32,
        available: usize,
    },
    #[error("file ends mid-event at byte {offset}")]
    Truncated { offset: usize },
    #[error("unsupported timing division {division:#06x}: only ticks-per-beat timing is handled")]
    BadDivision { division: u16 },
    #[error("data byte {byte:#04x} at byte {offset} arrived before any status byte")]
    OrphanDataByte { byte: u8, offset: usize },
    #[error("status byte {byte:#04x} at byte {offset} where a data byte was expected")]
    BadDataByte { byte: u8, offset: usize },
    #[error("variable-length quantity at byte {offset} runs past four bytes")]
    VlqTooLong { offset: usize },
    #[error("header declares {declared} tracks but the file contains {found}")]
    MissingTracks { declared: u16, found: u16 },
}

pub type Result<T> = std::result::Result<T, DecodeError>;
