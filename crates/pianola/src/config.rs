//! Grid policy loading from TOML files.

use std::path::Path;

use anyhow::{Context, Result};
use piano_roll::QuantizationPolicy;

/// Load a [`QuantizationPolicy`] from the `[policy]` section of a TOML
/// file. A file without that section yields the default policy.
///
/// ```toml
/// [policy]
/// resolution = { ticks = 120 }
/// pitch_range = { low = 21, high = 108 }
/// velocity = { bucketed = 8 }
/// ```
pub fn load_policy(path: &Path) -> Result<QuantizationPolicy> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read policy file: {}", path.display()))?;
    let table: toml::Table = contents
        .parse()
        .with_context(|| format!("failed to parse TOML: {}", path.display()))?;

    let policy = match table.get("policy") {
        Some(section) => {
            let policy: QuantizationPolicy = section
                .clone()
                .try_into()
                .context("failed to parse [policy] section")?;
            policy
        }
        None => QuantizationPolicy::default(),
    };
    policy
        .validate()
        .with_context(|| format!("unusable policy in {}", path.display()))?;
    Ok(policy)
}
