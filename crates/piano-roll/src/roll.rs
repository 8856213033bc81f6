use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smf::{EventKind, EventStream, MusicEvent};

use crate::policy::{PitchRange, Resolution};
use crate::{Result, RollError};

/// A piano roll: equal-width time frames over a pitch window, with the
/// sounding cells of each frame stored sorted by pitch.
///
/// Cells live in compressed sparse row form: `frame_starts[f]..
/// frame_starts[f + 1]` indexes frame `f`'s slice of the flat pitch and
/// velocity arrays. A roll is immutable once built; the transforms in
/// [`crate::transform`] return new rolls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PianoRoll {
    resolution: Resolution,
    pitch_range: PitchRange,
    frame_starts: Vec<u32>,
    pitches: Vec<u8>,
    velocities: Vec<u8>,
    sustain: Vec<bool>,
}

impl PianoRoll {
    /// Build a roll from per-frame cell lists of `(pitch, velocity)`.
    ///
    /// Cells may arrive in any order within a frame; a later entry for
    /// the same pitch wins. `sustain` must carry one flag per frame.
    pub fn from_frames(
        resolution: Resolution,
        pitch_range: PitchRange,
        frames: Vec<Vec<(u8, u8)>>,
        sustain: Vec<bool>,
    ) -> Result<Self> {
        resolution.validate()?;
        pitch_range.validate()?;
        if sustain.len() != frames.len() {
            return Err(RollError::MismatchedSustain {
                frames: frames.len(),
                flags: sustain.len(),
            });
        }

        let mut frame_starts = Vec::with_capacity(frames.len() + 1);
        let mut pitches = Vec::new();
        let mut velocities = Vec::new();
        frame_starts.push(0);
        for cells in &frames {
            let mut sorted: BTreeMap<u8, u8> = BTreeMap::new();
            for &(pitch, velocity) in cells {
                if !pitch_range.contains(pitch) {
                    return Err(RollError::PitchOutOfWindow {
                        pitch,
                        low: pitch_range.low,
                        high: pitch_range.high,
                    });
                }
                if velocity == 0 || velocity > 127 {
                    return Err(RollError::BadVelocity { velocity });
                }
                sorted.insert(pitch, velocity);
            }
            for (pitch, velocity) in sorted {
                pitches.push(pitch);
                velocities.push(velocity);
            }
            frame_starts.push(pitches.len() as u32);
        }
        Ok(Self {
            resolution,
            pitch_range,
            frame_starts,
            pitches,
            velocities,
            sustain,
        })
    }

    /// Assemble a roll from cells already sorted by `(frame, pitch)`
    /// with no duplicates. The builder and transforms uphold this.
    pub(crate) fn from_sorted_cells(
        resolution: Resolution,
        pitch_range: PitchRange,
        frame_count: usize,
        cells: &[(u32, u8, u8)],
        sustain: Vec<bool>,
    ) -> Self {
        let mut frame_starts = Vec::with_capacity(frame_count + 1);
        let mut pitches = Vec::with_capacity(cells.len());
        let mut velocities = Vec::with_capacity(cells.len());
        frame_starts.push(0);
        let mut cursor = 0;
        for frame in 0..frame_count as u32 {
            while cursor < cells.len() && cells[cursor].0 == frame {
                pitches.push(cells[cursor].1);
                velocities.push(cells[cursor].2);
                cursor += 1;
            }
            frame_starts.push(pitches.len() as u32);
        }
        Self {
            resolution,
            pitch_range,
            frame_starts,
            pitches,
            velocities,
            sustain,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn pitch_range(&self) -> PitchRange {
        self.pitch_range
    }

    pub fn frame_count(&self) -> usize {
        self.frame_starts.len() - 1
    }

    /// Total number of sounding cells across all frames.
    pub fn cell_count(&self) -> usize {
        self.pitches.len()
    }

    /// True when no frame has a sounding cell.
    pub fn is_silent(&self) -> bool {
        self.pitches.is_empty()
    }

    /// One flag per frame, true while the sustain pedal is down.
    pub fn sustain_flags(&self) -> &[bool] {
        &self.sustain
    }

    /// View one time step. Panics if `index >= frame_count()`.
    pub fn frame(&self, index: usize) -> Frame<'_> {
        let start = self.frame_starts[index] as usize;
        let end = self.frame_starts[index + 1] as usize;
        Frame {
            pitches: &self.pitches[start..end],
            velocities: &self.velocities[start..end],
            sustain: self.sustain[index],
        }
    }

    pub fn frames(&self) -> impl Iterator<Item = Frame<'_>> + '_ {
        (0..self.frame_count()).map(|index| self.frame(index))
    }

    /// Reconstruct an event stream that builds back into this roll.
    ///
    /// A run of frames holding the same pitch at the same velocity
    /// becomes one note; a velocity change between adjacent frames
    /// splits the run into separate notes. Sustain runs become pedal
    /// down/up pairs. Tick rolls land back on their original grid;
    /// seconds rolls get a one-second-per-beat tempo event so a frame
    /// of `w` seconds spans `w * ticks_per_beat` ticks.
    pub fn to_events(&self, ticks_per_beat: u16) -> EventStream {
        let frames = self.frame_count();
        let tick_of = |frame: usize| -> u64 {
            match self.resolution {
                Resolution::Ticks(ticks) => frame as u64 * u64::from(ticks),
                Resolution::Seconds(seconds) => {
                    (frame as f64 * seconds * f64::from(ticks_per_beat)).round() as u64
                }
            }
        };

        // Rank sorts note-offs ahead of same-tick note-ons so that a
        // velocity change reads as release-then-retrigger.
        let mut timed: Vec<(u64, u8, EventKind)> = Vec::new();
        if let Resolution::Seconds(_) = self.resolution {
            timed.push((
                0,
                1,
                EventKind::Tempo {
                    us_per_beat: 1_000_000,
                },
            ));
        }
        for index in 0..frames {
            let view = self.frame(index);
            for (pitch, velocity) in view.cells() {
                let starts = index == 0 || self.frame(index - 1).velocity_of(pitch) != Some(velocity);
                if starts {
                    timed.push((tick_of(index), 2, EventKind::NoteOn { pitch, velocity }));
                }
                let ends =
                    index + 1 == frames || self.frame(index + 1).velocity_of(pitch) != Some(velocity);
                if ends {
                    timed.push((tick_of(index + 1), 0, EventKind::NoteOff { pitch }));
                }
            }
        }

        let mut index = 0;
        while index < frames {
            if self.sustain[index] {
                let start = index;
                while index < frames && self.sustain[index] {
                    index += 1;
                }
                timed.push((tick_of(start), 1, EventKind::Pedal { value: 127 }));
                timed.push((tick_of(index), 1, EventKind::Pedal { value: 0 }));
            } else {
                index += 1;
            }
        }

        timed.sort_by_key(|&(tick, rank, _)| (tick, rank));
        let events = timed
            .into_iter()
            .map(|(tick, _, kind)| MusicEvent {
                tick,
                track: 0,
                kind,
            })
            .collect();
        EventStream {
            ticks_per_beat,
            track_count: 1,
            track_names: vec![None],
            final_tick: tick_of(frames),
            events,
        }
    }
}

/// Borrowed view of one time step, cells sorted by pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pitches: &'a [u8],
    velocities: &'a [u8],
    sustain: bool,
}

impl<'a> Frame<'a> {
    pub fn len(&self) -> usize {
        self.pitches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pitches.is_empty()
    }

    pub fn sustain(&self) -> bool {
        self.sustain
    }

    pub fn pitches(&self) -> &'a [u8] {
        self.pitches
    }

    pub fn active(&self, pitch: u8) -> bool {
        self.pitches.binary_search(&pitch).is_ok()
    }

    pub fn velocity_of(&self, pitch: u8) -> Option<u8> {
        self.pitches
            .binary_search(&pitch)
            .ok()
            .map(|index| self.velocities[index])
    }

    pub fn cells(&self) -> impl Iterator<Item = (u8, u8)> + 'a {
        self.pitches
            .iter()
            .copied()
            .zip(self.velocities.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn small_roll() -> PianoRoll {
        PianoRoll::from_frames(
            Resolution::Ticks(120),
            PitchRange::FULL,
            vec![
                vec![(60, 90), (64, 80)],
                vec![(60, 90)],
                vec![],
                vec![(72, 100)],
            ],
            vec![true, true, false, false],
        )
        .unwrap()
    }

    #[test]
    fn frames_expose_sorted_cells() {
        let roll = PianoRoll::from_frames(
            Resolution::Ticks(120),
            PitchRange::FULL,
            vec![vec![(72, 100), (60, 90), (64, 80)]],
            vec![false],
        )
        .unwrap();
        let frame = roll.frame(0);
        assert_eq!(frame.pitches(), &[60, 64, 72]);
        assert_eq!(frame.velocity_of(64), Some(80));
        assert_eq!(frame.velocity_of(61), None);
        assert!(frame.active(72));
    }

    #[test]
    fn later_duplicate_pitch_wins_within_a_frame() {
        let roll = PianoRoll::from_frames(
            Resolution::Ticks(120),
            PitchRange::FULL,
            vec![vec![(60, 40), (60, 110)]],
            vec![false],
        )
        .unwrap();
        assert_eq!(roll.frame(0).velocity_of(60), Some(110));
        assert_eq!(roll.cell_count(), 1);
    }

    #[test]
    fn rejects_cells_outside_the_window() {
        let result = PianoRoll::from_frames(
            Resolution::Ticks(120),
            PitchRange { low: 21, high: 108 },
            vec![vec![(110, 90)]],
            vec![false],
        );
        assert_eq!(
            result,
            Err(RollError::PitchOutOfWindow {
                pitch: 110,
                low: 21,
                high: 108
            })
        );
    }

    #[test]
    fn rejects_zero_velocity_and_bad_sustain_length() {
        let zero = PianoRoll::from_frames(
            Resolution::Ticks(120),
            PitchRange::FULL,
            vec![vec![(60, 0)]],
            vec![false],
        );
        assert_eq!(zero, Err(RollError::BadVelocity { velocity: 0 }));

        let short = PianoRoll::from_frames(
            Resolution::Ticks(120),
            PitchRange::FULL,
            vec![vec![], vec![]],
            vec![false],
        );
        assert_eq!(
            short,
            Err(RollError::MismatchedSustain {
                frames: 2,
                flags: 1
            })
        );
    }

    #[test]
    fn empty_roll_has_no_frames_and_is_silent() {
        let roll =
            PianoRoll::from_frames(Resolution::Ticks(1), PitchRange::FULL, vec![], vec![])
                .unwrap();
        assert_eq!(roll.frame_count(), 0);
        assert!(roll.is_silent());
        assert_eq!(roll.frames().count(), 0);
    }

    #[test]
    fn to_events_merges_contiguous_frames_into_spans() {
        let roll = small_roll();
        let stream = roll.to_events(480);

        assert_eq!(stream.final_tick, 480);
        assert_eq!(
            stream.events,
            vec![
                MusicEvent {
                    tick: 0,
                    track: 0,
                    kind: EventKind::Pedal { value: 127 },
                },
                MusicEvent {
                    tick: 0,
                    track: 0,
                    kind: EventKind::NoteOn {
                        pitch: 60,
                        velocity: 90,
                    },
                },
                MusicEvent {
                    tick: 0,
                    track: 0,
                    kind: EventKind::NoteOn {
                        pitch: 64,
                        velocity: 80,
                    },
                },
                MusicEvent {
                    tick: 120,
                    track: 0,
                    kind: EventKind::NoteOff { pitch: 64 },
                },
                MusicEvent {
                    tick: 240,
                    track: 0,
                    kind: EventKind::NoteOff { pitch: 60 },
                },
                MusicEvent {
                    tick: 240,
                    track: 0,
                    kind: EventKind::Pedal { value: 0 },
                },
                MusicEvent {
                    tick: 360,
                    track: 0,
                    kind: EventKind::NoteOn {
                        pitch: 72,
                        velocity: 100,
                    },
                },
                MusicEvent {
                    tick: 480,
                    track: 0,
                    kind: EventKind::NoteOff { pitch: 72 },
                },
            ]
        );
    }

    #[test]
    fn to_events_splits_spans_on_velocity_change() {
        let roll = PianoRoll::from_frames(
            Resolution::Ticks(100),
            PitchRange::FULL,
            vec![vec![(60, 90)], vec![(60, 50)]],
            vec![false, false],
        )
        .unwrap();
        let stream = roll.to_events(480);
        assert_eq!(
            stream.events,
            vec![
                MusicEvent {
                    tick: 0,
                    track: 0,
                    kind: EventKind::NoteOn {
                        pitch: 60,
                        velocity: 90,
                    },
                },
                MusicEvent {
                    tick: 100,
                    track: 0,
                    kind: EventKind::NoteOff { pitch: 60 },
                },
                MusicEvent {
                    tick: 100,
                    track: 0,
                    kind: EventKind::NoteOn {
                        pitch: 60,
                        velocity: 50,
                    },
                },
                MusicEvent {
                    tick: 200,
                    track: 0,
                    kind: EventKind::NoteOff { pitch: 60 },
                },
            ]
        );
    }

    #[test]
    fn seconds_rolls_export_with_an_explicit_tempo() {
        let roll = PianoRoll::from_frames(
            Resolution::Seconds(0.5),
            PitchRange::FULL,
            vec![vec![(60, 90)], vec![]],
            vec![false, false],
        )
        .unwrap();
        let stream = roll.to_events(480);
        assert_eq!(stream.initial_us_per_beat(), 1_000_000);
        // Half a second at one second per beat and 480 tpb.
        assert_eq!(stream.events[1].tick, 0);
        assert_eq!(stream.events[2].tick, 240);
        assert_eq!(stream.final_tick, 480);
        assert_eq!(stream.duration_seconds(), 1.0);
    }

    #[test]
    fn roll_round_trips_through_serde_json() {
        let roll = small_roll();
        let json = serde_json::to_string(&roll).unwrap();
        let back: PianoRoll = serde_json::from_str(&json).unwrap();
        assert_eq!(back, roll);
    }
}
