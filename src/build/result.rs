//! Terminal outcome of a build

use std::path::PathBuf;
use thiserror::Error;

use crate::error::{BuildError, ErrorKind};
use crate::plan::WalkWarning;

/// A file left out of the image because its content could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub source_path: PathBuf,
    pub relative_path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub output_path: PathBuf,
    pub files_written: usize,
    pub skipped: Vec<SkippedEntry>,
    /// Entries the walker left out (symlinks, special files, ...)
    pub warnings: Vec<WalkWarning>,
    /// Image size in 2048-byte blocks
    pub image_blocks: u32,
}

impl BuildReport {
    pub fn image_bytes(&self) -> u64 {
        self.image_blocks as u64 * 2048
    }
}

#[derive(Error, Debug)]
#[error("{error}")]
pub struct BuildFailure {
    #[source]
    pub error: BuildError,
    /// Files skipped before the build failed
    pub skipped: Vec<SkippedEntry>,
}

impl BuildFailure {
    pub fn new(error: BuildError, skipped: Vec<SkippedEntry>) -> Self {
        Self { error, skipped }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.is_cancelled()
    }
}

impl From<BuildError> for BuildFailure {
    fn from(error: BuildError) -> Self {
        Self::new(error, Vec::new())
    }
}

pub type BuildResult = std::result::Result<BuildReport, BuildFailure>;
