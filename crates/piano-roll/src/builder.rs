//! Quantizing an event stream onto a fixed grid.

use std::collections::HashMap;

use smf::{EventKind, EventStream, TempoMap};

use crate::policy::{QuantizationPolicy, Resolution};
use crate::roll::PianoRoll;
use crate::{Result, RollError};

/// Pedal positions at or above this count as "down".
const PEDAL_DOWN: u8 = 64;

/// Cut a stream into a piano roll under the given policy.
///
/// A note covers every frame its `[onset, offset)` interval overlaps,
/// with the onset velocity written into each covered cell. When notes
/// collide in a cell the later onset wins; among onsets on the same
/// tick the higher track index wins. Notes outside the pitch window are
/// dropped whole. A stream without a single note onset is an error.
pub fn build(stream: &EventStream, policy: &QuantizationPolicy) -> Result<PianoRoll> {
    policy.validate()?;
    if stream.note_on_count() == 0 {
        return Err(RollError::EmptyStream);
    }

    let mapper = FrameMapper::new(stream, policy.resolution);
    let frame_count = mapper.frame_count(stream.final_tick);

    let mut cells: Vec<Cell> = Vec::new();
    for note in pair_notes(stream) {
        if !policy.pitch_range.contains(note.pitch) {
            continue;
        }
        let velocity = policy.velocity.apply(note.velocity);
        let Some((first, last)) = mapper.frame_span(note.onset, note.offset, frame_count) else {
            continue;
        };
        for frame in first..=last {
            cells.push(Cell {
                frame: frame as u32,
                pitch: note.pitch,
                velocity,
                seq: note.seq,
            });
        }
    }

    // Later onsets overwrite earlier ones in shared cells: sort puts
    // the highest seq last, then the dedup folds it into the survivor.
    cells.sort_by_key(|c| (c.frame, c.pitch, c.seq));
    cells.dedup_by(|next, kept| {
        if next.frame == kept.frame && next.pitch == kept.pitch {
            kept.velocity = next.velocity;
            kept.seq = next.seq;
            true
        } else {
            false
        }
    });

    let flat: Vec<(u32, u8, u8)> = cells.iter().map(|c| (c.frame, c.pitch, c.velocity)).collect();
    let sustain = sustain_flags(stream, &mapper, frame_count);
    Ok(PianoRoll::from_sorted_cells(
        policy.resolution,
        policy.pitch_range,
        frame_count,
        &flat,
        sustain,
    ))
}

struct Cell {
    frame: u32,
    pitch: u8,
    velocity: u8,
    seq: u32,
}

struct PairedNote {
    onset: u64,
    offset: u64,
    pitch: u8,
    velocity: u8,
    /// Onset order in the stream; higher wins cell collisions.
    seq: u32,
}

/// Match note-ons with their closing note-offs. A note-on arriving
/// while the same `(track, pitch)` is already sounding closes the
/// ringing note at the retrigger tick. Note-offs with nothing open are
/// dropped. Notes still open at the end close at the final tick.
fn pair_notes(stream: &EventStream) -> Vec<PairedNote> {
    let mut open: HashMap<(usize, u8), (u64, u8, u32)> = HashMap::new();
    let mut notes = Vec::new();
    let mut seq: u32 = 0;
    for event in &stream.events {
        match event.kind {
            EventKind::NoteOn { pitch, velocity } => {
                if let Some((onset, vel, s)) =
                    open.insert((event.track, pitch), (event.tick, velocity, seq))
                {
                    notes.push(PairedNote {
                        onset,
                        offset: event.tick,
                        pitch,
                        velocity: vel,
                        seq: s,
                    });
                }
                seq += 1;
            }
            EventKind::NoteOff { pitch } => {
                if let Some((onset, velocity, s)) = open.remove(&(event.track, pitch)) {
                    notes.push(PairedNote {
                        onset,
                        offset: event.tick,
                        pitch,
                        velocity,
                        seq: s,
                    });
                }
            }
            _ => {}
        }
    }
    // The decoder closes everything it reads, but hand-built streams
    // may not.
    let mut leftovers: Vec<_> = open.into_iter().collect();
    leftovers.sort_unstable_by_key(|&(key, _)| key);
    for ((_, pitch), (onset, velocity, s)) in leftovers {
        notes.push(PairedNote {
            onset,
            offset: stream.final_tick,
            pitch,
            velocity,
            seq: s,
        });
    }
    notes
}

/// Maps tick intervals onto frame columns for either grid unit.
enum FrameMapper {
    Ticks { width: u64 },
    Seconds { map: TempoMap, width: f64 },
}

impl FrameMapper {
    fn new(stream: &EventStream, resolution: Resolution) -> Self {
        match resolution {
            Resolution::Ticks(ticks) => FrameMapper::Ticks {
                width: u64::from(ticks),
            },
            Resolution::Seconds(seconds) => FrameMapper::Seconds {
                map: stream.tempo_map(),
                width: seconds,
            },
        }
    }

    /// Frames needed to cover ticks `0..final_tick`.
    fn frame_count(&self, final_tick: u64) -> usize {
        match self {
            FrameMapper::Ticks { width } => final_tick.div_ceil(*width) as usize,
            FrameMapper::Seconds { map, width } => {
                (map.tick_to_seconds(final_tick) / width).ceil() as usize
            }
        }
    }

    /// Frames overlapped by `[onset, offset)`, clamped to the grid.
    /// `None` when the interval is empty or the grid has no frames.
    fn frame_span(&self, onset: u64, offset: u64, frame_count: usize) -> Option<(usize, usize)> {
        if offset <= onset || frame_count == 0 {
            return None;
        }
        let (first, last) = match self {
            FrameMapper::Ticks { width } => {
                let first = (onset / width) as usize;
                let last = (offset.div_ceil(*width) - 1) as usize;
                (first, last)
            }
            FrameMapper::Seconds { map, width } => {
                let onset_seconds = map.tick_to_seconds(onset);
                let offset_seconds = map.tick_to_seconds(offset);
                let first = (onset_seconds / width).floor() as usize;
                let last = ((offset_seconds / width).ceil() as usize)
                    .saturating_sub(1)
                    .max(first);
                (first, last)
            }
        };
        let last = last.min(frame_count - 1);
        if first > last {
            None
        } else {
            Some((first, last))
        }
    }
}

/// Sustain is on for every frame a pedal-down interval overlaps. Each
/// track's pedal is tracked separately; intervals from any track mark
/// the shared flags.
fn sustain_flags(stream: &EventStream, mapper: &FrameMapper, frame_count: usize) -> Vec<bool> {
    let mut flags = vec![false; frame_count];
    let mut down: HashMap<usize, u64> = HashMap::new();
    for event in &stream.events {
        if let EventKind::Pedal { value } = event.kind {
            if value >= PEDAL_DOWN {
                down.entry(event.track).or_insert(event.tick);
            } else if let Some(start) = down.remove(&event.track) {
                mark_span(mapper, frame_count, &mut flags, start, event.tick);
            }
        }
    }
    for (_, start) in down {
        mark_span(mapper, frame_count, &mut flags, start, stream.final_tick);
    }
    flags
}

fn mark_span(mapper: &FrameMapper, frame_count: usize, flags: &mut [bool], from: u64, to: u64) {
    if let Some((first, last)) = mapper.frame_span(from, to, frame_count) {
        for flag in &mut flags[first..=last] {
            *flag = true;
        }
    }
}
