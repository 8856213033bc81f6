//! Compact wire form of a roll.
//!
//! Little-endian layout:
//!
//! ```text
//! [unit u8][width f64][low u8][high u8][frame_count u64]
//! per frame: [(pitch u8)(velocity u8)]* [0xFF]
//! sustain bitmap: ceil(frame_count / 8) bytes, LSB first
//! ```
//!
//! Pitches never reach 0xFF, so the frame terminator is unambiguous.
//! Decoding validates every invariant the in-memory type upholds:
//! pitches strictly ascending and inside the window, velocities in
//! 1..=127, and no bytes left over.

use thiserror::Error;

use crate::policy::{PitchRange, Resolution};
use crate::roll::PianoRoll;

const UNIT_TICKS: u8 = 0;
const UNIT_SECONDS: u8 = 1;
const FRAME_END: u8 = 0xFF;

/// Why bytes could not be read back as a roll.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WireError {
    #[error("roll payload truncated at byte {offset}")]
    Truncated { offset: usize },
    #[error("unknown grid unit tag {tag:#04x}")]
    BadUnitTag { tag: u8 },
    #[error("grid width {width} is invalid for its unit")]
    BadWidth { width: f64 },
    #[error("pitch window {low}..={high} is invalid")]
    BadPitchWindow { low: u8, high: u8 },
    #[error("frame {frame}: pitch {pitch} out of window or out of order at byte {offset}")]
    BadCellPitch { frame: u64, pitch: u8, offset: usize },
    #[error("frame {frame}: velocity {velocity} at byte {offset} outside 1..=127")]
    BadCellVelocity {
        frame: u64,
        velocity: u8,
        offset: usize,
    },
    #[error("{count} trailing bytes after the sustain bitmap")]
    TrailingBytes { count: usize },
}

impl PianoRoll {
    /// Serialize to the wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let frames = self.frame_count();
        let mut out =
            Vec::with_capacity(19 + frames + self.cell_count() * 2 + frames.div_ceil(8));
        let (unit, width) = match self.resolution() {
            Resolution::Ticks(ticks) => (UNIT_TICKS, f64::from(ticks)),
            Resolution::Seconds(seconds) => (UNIT_SECONDS, seconds),
        };
        out.push(unit);
        out.extend_from_slice(&width.to_le_bytes());
        out.push(self.pitch_range().low);
        out.push(self.pitch_range().high);
        out.extend_from_slice(&(frames as u64).to_le_bytes());
        for frame in self.frames() {
            for (pitch, velocity) in frame.cells() {
                out.push(pitch);
                out.push(velocity);
            }
            out.push(FRAME_END);
        }
        let mut bitmap = vec![0u8; frames.div_ceil(8)];
        for (index, frame) in self.frames().enumerate() {
            if frame.sustain() {
                bitmap[index / 8] |= 1 << (index % 8);
            }
        }
        out.extend_from_slice(&bitmap);
        out
    }

    /// Parse the wire form, validating every field.
    pub fn from_bytes(bytes: &[u8]) -> Result<PianoRoll, WireError> {
        let mut reader = WireReader { bytes, pos: 0 };
        let unit = reader.u8()?;
        let width = f64::from_le_bytes(reader.array::<8>()?);
        let resolution = match unit {
            UNIT_TICKS => {
                let whole = width.is_finite()
                    && width > 0.0
                    && width.fract() == 0.0
                    && width <= f64::from(u32::MAX);
                if !whole {
                    return Err(WireError::BadWidth { width });
                }
                Resolution::Ticks(width as u32)
            }
            UNIT_SECONDS => {
                if !(width.is_finite() && width > 0.0) {
                    return Err(WireError::BadWidth { width });
                }
                Resolution::Seconds(width)
            }
            tag => return Err(WireError::BadUnitTag { tag }),
        };
        let low = reader.u8()?;
        let high = reader.u8()?;
        if low > high || high > 127 {
            return Err(WireError::BadPitchWindow { low, high });
        }
        let pitch_range = PitchRange { low, high };
        let frame_count = u64::from_le_bytes(reader.array::<8>()?);

        // Every frame consumes at least its terminator byte, so a lying
        // frame count dies on Truncated long before memory does.
        let mut cells: Vec<(u32, u8, u8)> = Vec::new();
        for frame in 0..frame_count {
            let mut last_pitch: Option<u8> = None;
            loop {
                let pitch_offset = reader.pos;
                let byte = reader.u8()?;
                if byte == FRAME_END {
                    break;
                }
                let pitch = byte;
                let in_order = last_pitch.map_or(true, |previous| pitch > previous);
                if !pitch_range.contains(pitch) || !in_order {
                    return Err(WireError::BadCellPitch {
                        frame,
                        pitch,
                        offset: pitch_offset,
                    });
                }
                let velocity_offset = reader.pos;
                let velocity = reader.u8()?;
                if velocity == 0 || velocity > 127 {
                    return Err(WireError::BadCellVelocity {
                        frame,
                        velocity,
                        offset: velocity_offset,
                    });
                }
                cells.push((frame as u32, pitch, velocity));
                last_pitch = Some(pitch);
            }
        }

        let frame_count = frame_count as usize;
        let bitmap = reader.take(frame_count.div_ceil(8))?;
        let mut sustain = Vec::with_capacity(frame_count);
        for index in 0..frame_count {
            sustain.push(bitmap[index / 8] & (1 << (index % 8)) != 0);
        }
        if reader.pos != bytes.len() {
            return Err(WireError::TrailingBytes {
                count: bytes.len() - reader.pos,
            });
        }

        Ok(PianoRoll::from_sorted_cells(
            resolution,
            pitch_range,
            frame_count,
            &cells,
            sustain,
        ))
    }
}

struct WireReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn u8(&mut self) -> Result<u8, WireError> {
        if self.pos >= self.bytes.len() {
            return Err(WireError::Truncated { offset: self.pos });
        }
        let byte = self.bytes[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if self.bytes.len() - self.pos < len {
            return Err(WireError::Truncated { offset: self.pos });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}
