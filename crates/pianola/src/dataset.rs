//! Batch conversion of a directory tree into one dataset.

use std::path::Path;

use anyhow::{Context, Result};
use piano_roll::{PianoRoll, PitchRange, QuantizationPolicy, Resolution, RollError, VelocityMode};
use roll_store::{DatasetItem, OpenMode, RollStore};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::convert::convert_file;

/// How the directory walk picks files and what happens to each roll.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Extensions that count as MIDI files, compared case-insensitively.
    pub extensions: Vec<String>,
    /// Adjustments applied to every converted roll before the keep
    /// filter sees it.
    pub normalize: Option<NormalizeOptions>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            extensions: vec!["mid".to_string(), "midi".to_string()],
            normalize: None,
        }
    }
}

/// Whole-roll adjustments run over each converted roll, in a fixed
/// order: crop, then velocity requantization, then resampling. Every
/// step is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    /// Crop to this pitch window.
    pub pitch_range: Option<PitchRange>,
    /// Re-snap stored velocities under this mode.
    pub velocity: Option<VelocityMode>,
    /// Resample onto this frame width; the unit must match the build
    /// grid's.
    pub resolution: Option<Resolution>,
}

impl NormalizeOptions {
    /// Check every step against the grid `policy` produces, so a bad
    /// plan is rejected before any file is touched.
    pub fn validate(&self, policy: &QuantizationPolicy) -> piano_roll::Result<()> {
        let probe = QuantizationPolicy {
            resolution: self.resolution.unwrap_or(policy.resolution),
            pitch_range: self.pitch_range.unwrap_or(policy.pitch_range),
            velocity: self.velocity.unwrap_or(policy.velocity),
        };
        probe.validate()?;
        if let Some(resolution) = self.resolution {
            if !policy.resolution.same_unit(resolution) {
                return Err(RollError::UnitMismatch {
                    have: policy.resolution,
                    requested: resolution,
                });
            }
        }
        Ok(())
    }

    /// Run the configured steps over one roll.
    pub fn apply(&self, mut roll: PianoRoll) -> piano_roll::Result<PianoRoll> {
        if let Some(range) = self.pitch_range {
            roll = roll.crop_pitch(range)?;
        }
        if let Some(mode) = self.velocity {
            roll = roll.quantize_velocity(mode)?;
        }
        if let Some(resolution) = self.resolution {
            roll = roll.resample(resolution)?;
        }
        Ok(roll)
    }
}

/// What a dataset build did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Items written to the store.
    pub converted: u64,
    /// Files that would not decode or grid; logged and skipped.
    pub failed: u64,
    /// Conversions the keep predicate rejected.
    pub filtered: u64,
}

/// Convert every MIDI file under `root` into a new dataset at
/// `store_path`, replacing whatever was there.
///
/// Files are visited in name order, so item ids are reproducible for a
/// given tree. A file that fails to convert is logged and skipped; the
/// batch carries on.
pub fn build_dataset(
    root: &Path,
    options: &BuildOptions,
    policy: &QuantizationPolicy,
    store_path: &Path,
) -> Result<BuildReport> {
    build_dataset_filtered(root, options, policy, store_path, |_| true)
}

/// [`build_dataset`] with a keep predicate; rejected items count as
/// filtered rather than failed.
pub fn build_dataset_filtered<F>(
    root: &Path,
    options: &BuildOptions,
    policy: &QuantizationPolicy,
    store_path: &Path,
    mut keep: F,
) -> Result<BuildReport>
where
    F: FnMut(&DatasetItem) -> bool,
{
    policy.validate().context("rejecting the grid policy")?;
    if let Some(normalize) = &options.normalize {
        normalize
            .validate(policy)
            .context("rejecting the normalize plan")?;
    }
    let mut store = RollStore::open(store_path, OpenMode::Write)
        .with_context(|| format!("creating a dataset at {}", store_path.display()))?;
    let mut report = BuildReport::default();

    let mut walk = WalkDir::new(root).sort_by_file_name();
    if !options.recursive {
        walk = walk.max_depth(1);
    }
    for entry in walk
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
    {
        let path = entry.path();
        if !matches_extension(path, &options.extensions) {
            continue;
        }
        match convert_file(path, policy) {
            Ok(mut item) => {
                if let Some(normalize) = &options.normalize {
                    item.roll = normalize
                        .apply(item.roll)
                        .with_context(|| format!("normalizing {}", path.display()))?;
                }
                if keep(&item) {
                    store
                        .append(&item)
                        .with_context(|| format!("appending {}", path.display()))?;
                    report.converted += 1;
                } else {
                    report.filtered += 1;
                }
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unconvertible file");
                report.failed += 1;
            }
        }
    }

    store.close().context("closing the dataset")?;
    info!(
        store = %store_path.display(),
        converted = report.converted,
        failed = report.failed,
        filtered = report.filtered,
        "dataset build finished"
    );
    Ok(report)
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
}
