//! Piano rolls: sparse time-by-pitch grids cut from MIDI event streams.
//!
//! [`build`] quantizes an [`smf::EventStream`] onto a fixed grid under a
//! [`QuantizationPolicy`]. The resulting [`PianoRoll`] is immutable;
//! [`transform`] offers cropping, velocity requantization, and
//! resampling as whole-roll operations, and [`codec`] gives every roll
//! a compact wire form.

use thiserror::Error;

pub mod builder;
pub mod codec;
pub mod policy;
pub mod roll;
pub mod transform;

pub use builder::build;
pub use codec::WireError;
pub use policy::{PitchRange, QuantizationPolicy, Resolution, VelocityMode};
pub use roll::{Frame, PianoRoll};

/// Why a roll could not be built or transformed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RollError {
    #[error("event stream has no note onsets")]
    EmptyStream,
    #[error("invalid pitch window {low}..={high}")]
    InvalidRange { low: u8, high: u8 },
    #[error("resolution must be positive, got {resolution}")]
    InvalidResolution { resolution: Resolution },
    #[error("cannot resample a {have} roll onto a {requested} grid")]
    UnitMismatch {
        have: Resolution,
        requested: Resolution,
    },
    #[error("bucketed velocity needs at least one bucket")]
    InvalidBucketCount,
    #[error("unknown velocity mode {given:?}, expected none, binary, or bucketed:N")]
    UnknownVelocityMode { given: String },
    #[error("pitch {pitch} outside the window {low}..={high}")]
    PitchOutOfWindow { pitch: u8, low: u8, high: u8 },
    #[error("velocity {velocity} outside 1..=127")]
    BadVelocity { velocity: u8 },
    #[error("{frames} frames but {flags} sustain flags")]
    MismatchedSustain { frames: usize, flags: usize },
}

pub type Result<T> = std::result::Result<T, RollError>;
