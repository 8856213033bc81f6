use serde::{Deserialize, Serialize};

use crate::event::{EventKind, EventStream, DEFAULT_US_PER_BEAT};

/// One stretch of constant tempo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct TempoSegment {
    start_tick: u64,
    /// Seconds elapsed from tick 0 to `start_tick`.
    start_seconds: f64,
    us_per_beat: u32,
}

/// Piecewise-constant map from ticks to wall-clock seconds.
///
/// Always holds at least one segment starting at tick 0, so lookups
/// before the first tempo event fall back to 120 bpm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoMap {
    ticks_per_beat: u16,
    segments: Vec<TempoSegment>,
}

impl TempoMap {
    /// Collect the tempo events of a stream. Several changes on the
    /// same tick collapse to the last one in stream order.
    pub fn from_stream(stream: &EventStream) -> Self {
        let changes = stream.events.iter().filter_map(|e| match e.kind {
            EventKind::Tempo { us_per_beat } => Some((e.tick, us_per_beat)),
            _ => None,
        });
        Self::new(stream.ticks_per_beat, changes)
    }

    /// Build a map from `(tick, us_per_beat)` changes sorted by tick.
    /// `ticks_per_beat` must be non-zero; the decoder guarantees this
    /// for streams it produces.
    pub fn new(ticks_per_beat: u16, changes: impl IntoIterator<Item = (u64, u32)>) -> Self {
        let mut closed = Vec::new();
        let mut open = TempoSegment {
            start_tick: 0,
            start_seconds: 0.0,
            us_per_beat: DEFAULT_US_PER_BEAT,
        };
        for (tick, us_per_beat) in changes {
            if tick <= open.start_tick {
                // A change on the segment boundary replaces its tempo.
                open.us_per_beat = us_per_beat;
                continue;
            }
            let elapsed = segment_seconds(tick - open.start_tick, open.us_per_beat, ticks_per_beat);
            closed.push(open);
            open = TempoSegment {
                start_tick: tick,
                start_seconds: open.start_seconds + elapsed,
                us_per_beat,
            };
        }
        closed.push(open);
        Self {
            ticks_per_beat,
            segments: closed,
        }
    }

    /// Seconds from the start of the file to `tick`.
    pub fn tick_to_seconds(&self, tick: u64) -> f64 {
        let segment = self.segment_at(tick);
        segment.start_seconds
            + segment_seconds(tick - segment.start_tick, segment.us_per_beat, self.ticks_per_beat)
    }

    /// Tempo in effect at `tick`.
    pub fn us_per_beat_at(&self, tick: u64) -> u32 {
        self.segment_at(tick).us_per_beat
    }

    pub fn ticks_per_beat(&self) -> u16 {
        self.ticks_per_beat
    }

    fn segment_at(&self, tick: u64) -> TempoSegment {
        // Segment 0 starts at tick 0, so the partition point is >= 1.
        let idx = self.segments.partition_point(|s| s.start_tick <= tick);
        self.segments[idx.saturating_sub(1)]
    }
}

/// Multiply before dividing so beat-aligned ticks convert exactly.
fn segment_seconds(delta_ticks: u64, us_per_beat: u32, ticks_per_beat: u16) -> f64 {
    delta_ticks as f64 * f64::from(us_per_beat) / 1_000_000.0 / f64::from(ticks_per_beat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MusicEvent;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_tempo_when_no_changes() {
        let map = TempoMap::new(480, []);
        // 120 bpm: one beat of 480 ticks is half a second.
        assert_eq!(map.tick_to_seconds(0), 0.0);
        assert_eq!(map.tick_to_seconds(480), 0.5);
        assert_eq!(map.tick_to_seconds(960), 1.0);
    }

    #[test]
    fn duration_sums_over_segments() {
        // 60 bpm for the first beat, then 30 bpm: 1s + 2s.
        let map = TempoMap::new(480, [(0, 1_000_000), (480, 2_000_000)]);
        assert_eq!(map.tick_to_seconds(480), 1.0);
        assert_eq!(map.tick_to_seconds(960), 3.0);
        assert_eq!(map.us_per_beat_at(479), 1_000_000);
        assert_eq!(map.us_per_beat_at(480), 2_000_000);
    }

    #[test]
    fn change_mid_file_leaves_earlier_ticks_alone() {
        let map = TempoMap::new(100, [(50, 2_000_000)]);
        assert_eq!(map.tick_to_seconds(50), 0.25);
        assert_eq!(map.tick_to_seconds(100), 1.25);
    }

    #[test]
    fn last_change_on_a_tick_wins() {
        let map = TempoMap::new(480, [(0, 1_000_000), (0, 250_000)]);
        assert_eq!(map.us_per_beat_at(0), 250_000);
        assert_eq!(map.tick_to_seconds(480), 0.25);
    }

    #[test]
    fn from_stream_picks_up_tempo_events_only() {
        let stream = EventStream {
            ticks_per_beat: 480,
            track_count: 2,
            track_names: vec![None, None],
            final_tick: 960,
            events: vec![
                MusicEvent {
                    tick: 0,
                    track: 0,
                    kind: EventKind::Tempo {
                        us_per_beat: 1_000_000,
                    },
                },
                MusicEvent {
                    tick: 0,
                    track: 1,
                    kind: EventKind::NoteOn {
                        pitch: 60,
                        velocity: 90,
                    },
                },
                MusicEvent {
                    tick: 480,
                    track: 0,
                    kind: EventKind::Tempo {
                        us_per_beat: 2_000_000,
                    },
                },
                MusicEvent {
                    tick: 960,
                    track: 1,
                    kind: EventKind::NoteOff { pitch: 60 },
                },
            ],
        };
        assert_eq!(stream.duration_seconds(), 3.0);
    }
}
