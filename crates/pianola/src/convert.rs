//! Single-file conversion.

use std::path::Path;

use anyhow::{Context, Result};
use piano_roll::QuantizationPolicy;
use roll_store::DatasetItem;

/// Decode one MIDI file's bytes, grid it, and stamp a dataset item.
///
/// The item's duration follows the file's tempo timeline, so a tempo
/// change halfway through shows up in the metadata even on a tick grid.
pub fn convert_bytes(
    bytes: &[u8],
    policy: &QuantizationPolicy,
    source_name: &str,
) -> Result<DatasetItem> {
    let stream = smf::decode(bytes).with_context(|| format!("decoding {source_name}"))?;
    let roll = piano_roll::build(&stream, policy)
        .with_context(|| format!("gridding {source_name}"))?;
    let duration = stream.duration_seconds();
    Ok(DatasetItem::new(roll, source_name, duration))
}

/// Read and convert one file. The item's source name is the file name.
pub fn convert_file(path: &Path, policy: &QuantizationPolicy) -> Result<DatasetItem> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    convert_bytes(&bytes, policy, &name)
}
