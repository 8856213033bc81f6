//! The conversion engine: MIDI files in, piano-roll datasets out.
//!
//! Composes the stack end to end. [`convert_bytes`] takes one file
//! through decode, grid, and stamping; [`dataset::build_dataset`] walks
//! a directory tree and writes every convertible file into one
//! [`roll_store::RollStore`]; [`config::load_policy`] reads the grid
//! parameters from a TOML file.

pub mod config;
pub mod convert;
pub mod dataset;

pub use config::load_policy;
pub use convert::{convert_bytes, convert_file};
pub use dataset::{
    build_dataset, build_dataset_filtered, BuildOptions, BuildReport, NormalizeOptions,
};

pub use piano_roll::{PianoRoll, QuantizationPolicy};
pub use roll_store::{DatasetItem, OpenMode, RollStore};
