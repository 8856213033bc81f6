//! Whole-roll transformations. Every operation leaves the input roll
//! untouched and returns a new one.

use std::collections::BTreeMap;

use crate::policy::{PitchRange, Resolution, VelocityMode};
use crate::roll::PianoRoll;
use crate::{Result, RollError};

/// Slack for float overlap comparisons on the seconds grid.
const OVERLAP_EPSILON: f64 = 1e-9;

impl PianoRoll {
    /// Narrow (or widen) the pitch window, dropping cells outside it.
    /// Frame count, sustain flags, and resolution stay as they are.
    pub fn crop_pitch(&self, range: PitchRange) -> Result<PianoRoll> {
        range.validate()?;
        let mut cells = Vec::with_capacity(self.cell_count());
        for (frame, view) in self.frames().enumerate() {
            for (pitch, velocity) in view.cells() {
                if range.contains(pitch) {
                    cells.push((frame as u32, pitch, velocity));
                }
            }
        }
        Ok(PianoRoll::from_sorted_cells(
            self.resolution(),
            range,
            self.frame_count(),
            &cells,
            self.sustain_flags().to_vec(),
        ))
    }

    /// Re-snap every stored velocity under `mode`.
    pub fn quantize_velocity(&self, mode: VelocityMode) -> Result<PianoRoll> {
        mode.validate()?;
        let mut cells = Vec::with_capacity(self.cell_count());
        for (frame, view) in self.frames().enumerate() {
            for (pitch, velocity) in view.cells() {
                cells.push((frame as u32, pitch, mode.apply(velocity)));
            }
        }
        Ok(PianoRoll::from_sorted_cells(
            self.resolution(),
            self.pitch_range(),
            self.frame_count(),
            &cells,
            self.sustain_flags().to_vec(),
        ))
    }

    /// Regrid onto a new frame width in the same unit.
    ///
    /// A pitch sounds in a target frame when source cells cover at
    /// least half the target window, counting overlap time; the flag
    /// works the same way for sustain. The velocity comes from the
    /// source column overlapping the window longest, earliest column
    /// winning ties.
    pub fn resample(&self, resolution: Resolution) -> Result<PianoRoll> {
        resolution.validate()?;
        if !self.resolution().same_unit(resolution) {
            return Err(RollError::UnitMismatch {
                have: self.resolution(),
                requested: resolution,
            });
        }

        let old_width = self.resolution().width();
        let new_width = resolution.width();
        let old_frames = self.frame_count();
        let duration = old_frames as f64 * old_width;
        let new_frames = if old_frames == 0 {
            0
        } else {
            (duration / new_width).ceil() as usize
        };

        let mut cells: Vec<(u32, u8, u8)> = Vec::new();
        let mut sustain = Vec::with_capacity(new_frames);
        for target in 0..new_frames {
            let window_start = target as f64 * new_width;
            let window_end = window_start + new_width;
            let first = (window_start / old_width).floor() as usize;
            let last = ((window_end / old_width).ceil() as usize).min(old_frames);

            let mut acc: BTreeMap<u8, CellAcc> = BTreeMap::new();
            let mut sustain_time = 0.0;
            for source in first..last {
                let source_start = source as f64 * old_width;
                let source_end = source_start + old_width;
                let overlap = source_end.min(window_end) - source_start.max(window_start);
                if overlap <= 0.0 {
                    continue;
                }
                let view = self.frame(source);
                if view.sustain() {
                    sustain_time += overlap;
                }
                for (pitch, velocity) in view.cells() {
                    let entry = acc.entry(pitch).or_insert(CellAcc {
                        on_time: 0.0,
                        best_overlap: 0.0,
                        velocity,
                    });
                    entry.on_time += overlap;
                    // Strictly-greater keeps the earliest column on ties.
                    if overlap > entry.best_overlap {
                        entry.best_overlap = overlap;
                        entry.velocity = velocity;
                    }
                }
            }

            let threshold = new_width / 2.0 - OVERLAP_EPSILON;
            for (pitch, cell) in acc {
                if cell.on_time >= threshold {
                    cells.push((target as u32, pitch, cell.velocity));
                }
            }
            sustain.push(sustain_time >= threshold);
        }

        Ok(PianoRoll::from_sorted_cells(
            resolution,
            self.pitch_range(),
            new_frames,
            &cells,
            sustain,
        ))
    }
}

struct CellAcc {
    on_time: f64,
    best_overlap: f64,
    velocity: u8,
}
