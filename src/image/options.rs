//! Writer configuration

use chrono::{DateTime, Utc};

use crate::naming::InterchangeLevel;

pub const DEFAULT_SYSTEM_ID: &str = "LINUX";
pub const DEFAULT_APPLICATION: &str = "ISO-CREATOR";

#[derive(Debug, Clone, PartialEq)]
pub struct WriteOptions {
    /// Add the Joliet supplementary descriptor and directory tree
    pub joliet: bool,
    /// Attach Rock Ridge entries to primary directory records
    pub rock_ridge: bool,
    pub interchange_level: InterchangeLevel,
    /// Leave out files whose content cannot be read instead of failing
    pub skip_on_file_error: bool,
    /// Creation and modification date of the volume; `None` leaves them
    /// unspecified so repeated builds are identical
    pub recorded_at: Option<DateTime<Utc>>,
    pub system_id: String,
    pub publisher: String,
    pub preparer: String,
    pub application: String,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            joliet: true,
            rock_ridge: true,
            interchange_level: InterchangeLevel::One,
            skip_on_file_error: true,
            recorded_at: None,
            system_id: DEFAULT_SYSTEM_ID.to_string(),
            publisher: String::new(),
            preparer: String::new(),
            application: DEFAULT_APPLICATION.to_string(),
        }
    }
}
