use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::engine::{MAX_ID, MIN_ID};
use crate::StoreError;

/// Parameters of one store instance, fixed for its whole lifetime.
///
/// Every field other than `path` has a conservative default, so the
/// struct can be embedded in a host's config file with only the data
/// file path spelled out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the single data file owned by this store.
    pub path: PathBuf,

    /// Size of the scratch buffer used for all file transfers.
    #[serde(default = "default_scratch_buffer_size")]
    pub scratch_buffer_size: usize,

    /// The data file is grown to at least this length on creation.
    #[serde(default = "default_min_file_size")]
    pub min_file_size: u64,

    /// Minimum chunk appended to the file when no free interval can
    /// satisfy an allocation.
    #[serde(default = "default_growth_quantum")]
    pub growth_quantum: u64,

    /// First id handed out in a fresh file.
    #[serde(default = "default_start_id")]
    pub start_id: u64,
}

fn default_scratch_buffer_size() -> usize {
    8 * 1024
}

fn default_min_file_size() -> u64 {
    64 * 1024
}

fn default_growth_quantum() -> u64 {
    16 * 1024
}

fn default_start_id() -> u64 {
    MIN_ID
}

impl Default for StoreConfig {
    /// Default parameters with an empty path; hosts set the path before
    /// opening.
    fn default() -> Self {
        Self::new(PathBuf::new())
    }
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            scratch_buffer_size: default_scratch_buffer_size(),
            min_file_size: default_min_file_size(),
            growth_quantum: default_growth_quantum(),
            start_id: default_start_id(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        if self.scratch_buffer_size == 0 {
            return Err(StoreError::InvalidConfig(
                "scratch_buffer_size must be positive".into(),
            ));
        }

        if self.min_file_size == 0 {
            return Err(StoreError::InvalidConfig(
                "min_file_size must be positive".into(),
            ));
        }

        if !(MIN_ID..=MAX_ID).contains(&self.start_id) {
            return Err(StoreError::InvalidConfig(format!(
                "start_id must lie within {MIN_ID}..={MAX_ID}"
            )));
        }

        Ok(())
    }
}
