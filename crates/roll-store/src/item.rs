use chrono::{DateTime, SubsecRound, Utc};
use piano_roll::PianoRoll;
use serde::{Deserialize, Serialize};

/// One converted piece: the roll plus the provenance the dataset keeps.
///
/// Items are immutable once written; a dataset only ever grows or is
/// compacted into a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetItem {
    pub roll: PianoRoll,
    pub source_filename: String,
    pub duration_seconds: f64,
    pub created_at: DateTime<Utc>,
}

impl DatasetItem {
    /// Stamp a freshly converted roll.
    ///
    /// The timestamp is truncated to microseconds, the precision the
    /// record format stores, so an item compares equal to itself after
    /// a trip through disk.
    pub fn new(
        roll: PianoRoll,
        source_filename: impl Into<String>,
        duration_seconds: f64,
    ) -> Self {
        Self {
            roll,
            source_filename: source_filename.into(),
            duration_seconds,
            created_at: Utc::now().trunc_subsecs(6),
        }
    }
}
