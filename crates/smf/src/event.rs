use serde::{Deserialize, Serialize};

use crate::tempo::TempoMap;

/// Tempo assumed until a file's first tempo event: 120 bpm.
pub const DEFAULT_US_PER_BEAT: u32 = 500_000;

/// What happened at a point on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A key went down. Velocity is 1..=127; a wire NoteOn with
    /// velocity 0 decodes as [`EventKind::NoteOff`].
    NoteOn { pitch: u8, velocity: u8 },
    /// A key came up.
    NoteOff { pitch: u8 },
    /// Tempo change, in microseconds per quarter note.
    Tempo { us_per_beat: u32 },
    /// Sustain pedal (controller 64) position, 0..=127.
    Pedal { value: u8 },
}

/// One event placed on the shared tick timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicEvent {
    /// Absolute ticks since the start of the file.
    pub tick: u64,
    /// Zero-based index of the source track.
    pub track: usize,
    pub kind: EventKind,
}

/// A MIDI file flattened into one time-ordered event sequence.
///
/// Events are sorted by `(tick, track)`; events from the same track at
/// the same tick keep their file order. The decoder closes any note
/// still sounding at the end of the file, so every `NoteOn` here has a
/// matching `NoteOff`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventStream {
    /// Timing division of the source file, in ticks per quarter note.
    pub ticks_per_beat: u16,
    /// Number of tracks the events were merged from.
    pub track_count: usize,
    /// Track names from 0x03 meta events, indexed by track.
    pub track_names: Vec<Option<String>>,
    /// Tick of the latest end-of-track across all tracks.
    pub final_tick: u64,
    pub events: Vec<MusicEvent>,
}

impl EventStream {
    /// Tempo in effect at tick 0. When several tempo events share
    /// tick 0 the last one wins, matching [`TempoMap`].
    pub fn initial_us_per_beat(&self) -> u32 {
        self.events
            .iter()
            .take_while(|e| e.tick == 0)
            .filter_map(|e| match e.kind {
                EventKind::Tempo { us_per_beat } => Some(us_per_beat),
                _ => None,
            })
            .last()
            .unwrap_or(DEFAULT_US_PER_BEAT)
    }

    /// Build the tick-to-seconds map for this stream.
    pub fn tempo_map(&self) -> TempoMap {
        TempoMap::from_stream(self)
    }

    /// Wall-clock length of the file, summed over tempo segments.
    pub fn duration_seconds(&self) -> f64 {
        self.tempo_map().tick_to_seconds(self.final_tick)
    }

    /// Number of note onsets in the stream.
    pub fn note_on_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::NoteOn { .. }))
            .count()
    }
}
