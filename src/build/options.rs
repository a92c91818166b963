//! User-facing build options
//!
//! One struct covers both the plan and the write stage so it can be
//! persisted as a single block of settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::image::{DEFAULT_APPLICATION, DEFAULT_SYSTEM_ID, WriteOptions};
use crate::naming::{DEFAULT_JOLIET_MAX_LEN, InterchangeLevel, Sanitizer};
use crate::plan::{PlanOptions, SymlinkPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub joliet: bool,
    pub rock_ridge: bool,
    pub interchange_level: InterchangeLevel,
    /// Leave out unreadable files instead of failing the build
    pub skip_on_file_error: bool,
    /// Maximum Joliet name length in UCS-2 units
    pub joliet_max_len: usize,
    /// Keep symlinks as Rock Ridge entries instead of skipping them
    pub record_symlinks: bool,
    pub publisher: String,
    pub preparer: String,
    /// Fixed volume creation time; not persisted
    #[serde(skip)]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            joliet: true,
            rock_ridge: true,
            interchange_level: InterchangeLevel::One,
            skip_on_file_error: true,
            joliet_max_len: DEFAULT_JOLIET_MAX_LEN,
            record_symlinks: false,
            publisher: String::new(),
            preparer: String::new(),
            recorded_at: None,
        }
    }
}

impl BuildOptions {
    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            sanitizer: Sanitizer::new(self.interchange_level, self.joliet_max_len),
            symlinks: if self.record_symlinks {
                SymlinkPolicy::Record
            } else {
                SymlinkPolicy::Skip
            },
        }
    }

    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            joliet: self.joliet,
            rock_ridge: self.rock_ridge,
            interchange_level: self.interchange_level,
            skip_on_file_error: self.skip_on_file_error,
            recorded_at: self.recorded_at,
            system_id: DEFAULT_SYSTEM_ID.to_string(),
            publisher: self.publisher.clone(),
            preparer: self.preparer.clone(),
            application: DEFAULT_APPLICATION.to_string(),
        }
    }
}
