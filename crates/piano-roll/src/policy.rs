use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Result, RollError};

/// Width of one roll frame, in the unit the grid is defined over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// A fixed number of MIDI ticks per frame.
    Ticks(u32),
    /// A fixed stretch of wall-clock time per frame.
    Seconds(f64),
}

impl Resolution {
    pub(crate) fn validate(self) -> Result<()> {
        let ok = match self {
            Resolution::Ticks(ticks) => ticks > 0,
            Resolution::Seconds(seconds) => seconds > 0.0 && seconds.is_finite(),
        };
        if ok {
            Ok(())
        } else {
            Err(RollError::InvalidResolution { resolution: self })
        }
    }

    /// Frame width as a float in the native unit.
    pub(crate) fn width(self) -> f64 {
        match self {
            Resolution::Ticks(ticks) => f64::from(ticks),
            Resolution::Seconds(seconds) => seconds,
        }
    }

    /// Whether two resolutions measure frames in the same unit.
    pub fn same_unit(self, other: Resolution) -> bool {
        matches!(
            (self, other),
            (Resolution::Ticks(_), Resolution::Ticks(_))
                | (Resolution::Seconds(_), Resolution::Seconds(_))
        )
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Ticks(ticks) => write!(f, "{ticks} ticks"),
            Resolution::Seconds(seconds) => write!(f, "{seconds}s"),
        }
    }
}

/// Inclusive pitch window kept in a roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitchRange {
    pub low: u8,
    pub high: u8,
}

impl PitchRange {
    /// The full MIDI pitch space.
    pub const FULL: PitchRange = PitchRange { low: 0, high: 127 };

    /// The 88 keys of a standard piano, A0 through C8.
    pub const PIANO: PitchRange = PitchRange { low: 21, high: 108 };

    pub fn new(low: u8, high: u8) -> Result<Self> {
        let range = PitchRange { low, high };
        range.validate()?;
        Ok(range)
    }

    pub(crate) fn validate(self) -> Result<()> {
        if self.low > self.high || self.high > 127 {
            return Err(RollError::InvalidRange {
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }

    pub fn contains(self, pitch: u8) -> bool {
        pitch >= self.low && pitch <= self.high
    }

    /// Number of pitches in the window.
    pub fn width(self) -> usize {
        usize::from(self.high - self.low) + 1
    }
}

impl Default for PitchRange {
    fn default() -> Self {
        Self::FULL
    }
}

/// How onset velocities are stored in a roll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityMode {
    /// Keep velocities as played.
    #[default]
    Unquantized,
    /// Every onset becomes velocity 100.
    Binary,
    /// Snap each velocity to the midpoint of one of `n` equal buckets
    /// over 1..=127.
    Bucketed(u8),
}

impl VelocityMode {
    pub(crate) fn validate(self) -> Result<()> {
        if self == VelocityMode::Bucketed(0) {
            return Err(RollError::InvalidBucketCount);
        }
        Ok(())
    }

    /// Map a raw velocity into this mode. Input is clamped to the
    /// playable 1..=127 first, so the result always lands there too.
    pub fn apply(self, velocity: u8) -> u8 {
        let velocity = velocity.clamp(1, 127);
        match self {
            VelocityMode::Unquantized => velocity,
            VelocityMode::Binary => 100,
            VelocityMode::Bucketed(buckets) => {
                let n = u32::from(buckets.max(1));
                let idx = u32::from(velocity - 1) * n / 127;
                // Midpoint of the bucket's actual velocity span, so a
                // second application cannot move the value again.
                let lo = (127 * idx).div_ceil(n) + 1;
                let hi = (127 * (idx + 1)).div_ceil(n);
                ((lo + hi) / 2) as u8
            }
        }
    }
}

impl FromStr for VelocityMode {
    type Err = RollError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(VelocityMode::Unquantized),
            "binary" => Ok(VelocityMode::Binary),
            other => {
                let count = other
                    .strip_prefix("bucketed:")
                    .and_then(|n| n.parse::<u8>().ok())
                    .ok_or_else(|| RollError::UnknownVelocityMode {
                        given: other.to_owned(),
                    })?;
                let mode = VelocityMode::Bucketed(count);
                mode.validate()?;
                Ok(mode)
            }
        }
    }
}

impl fmt::Display for VelocityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VelocityMode::Unquantized => f.write_str("none"),
            VelocityMode::Binary => f.write_str("binary"),
            VelocityMode::Bucketed(n) => write!(f, "bucketed:{n}"),
        }
    }
}

/// Everything the builder needs to cut a stream into a grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizationPolicy {
    pub resolution: Resolution,
    pub pitch_range: PitchRange,
    pub velocity: VelocityMode,
}

impl Default for QuantizationPolicy {
    /// A quarter-beat grid at the common 480 ticks per beat, over the
    /// full pitch space, velocities as played.
    fn default() -> Self {
        Self {
            resolution: Resolution::Ticks(120),
            pitch_range: PitchRange::FULL,
            velocity: VelocityMode::Unquantized,
        }
    }
}

impl QuantizationPolicy {
    /// Reject unusable parameter combinations before any work is done.
    pub fn validate(&self) -> Result<()> {
        self.resolution.validate()?;
        self.pitch_range.validate()?;
        self.velocity.validate()
    }
}
