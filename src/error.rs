//! Error types for image builds
//!
//! Structural errors (bad source root, output I/O) always abort a build.
//! `FileRead` is the only per-entry error; whether it aborts depends on
//! `skip_on_file_error`.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Field-less discriminant of [`BuildError`], for callers that only need
/// to branch on the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotADirectory,
    NameCollisionUnresolved,
    FileReadError,
    OutputWriteError,
    TooManyDirectories,
    Cancelled,
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("source is not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    /// Sanitizer ran out of numeric suffixes. Should be unreachable.
    #[error("no unique name left for '{name}' in {}", parent.display())]
    NameCollisionUnresolved { parent: PathBuf, name: String },

    #[error("failed to read {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Path table parent numbers are 16-bit
    #[error("{count} directories exceed the path table limit of 65535")]
    TooManyDirectories { count: usize },
    #[error("build cancelled")]
    Cancelled,
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::NotADirectory { .. } => ErrorKind::NotADirectory,
            BuildError::NameCollisionUnresolved { .. } => ErrorKind::NameCollisionUnresolved,
            BuildError::FileRead { .. } => ErrorKind::FileReadError,
            BuildError::OutputWrite { .. } => ErrorKind::OutputWriteError,
            BuildError::TooManyDirectories { .. } => ErrorKind::TooManyDirectories,
            BuildError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// The offending path, when the error has one
    pub fn path(&self) -> Option<&Path> {
        match self {
            BuildError::NotADirectory { path }
            | BuildError::FileRead { path, .. }
            | BuildError::OutputWrite { path, .. } => Some(path),
            BuildError::NameCollisionUnresolved { parent, .. } => Some(parent),
            BuildError::TooManyDirectories { .. } | BuildError::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BuildError::Cancelled)
    }

    pub(crate) fn output(path: &Path, source: io::Error) -> Self {
        BuildError::OutputWrite {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type alias for build operations
pub type Result<T> = std::result::Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = BuildError::NotADirectory {
            path: PathBuf::from("/missing"),
        };
        assert_eq!(err.kind(), ErrorKind::NotADirectory);
        assert_eq!(err.path(), Some(Path::new("/missing")));

        let err = BuildError::FileRead {
            path: PathBuf::from("/a"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(err.kind(), ErrorKind::FileReadError);

        assert_eq!(BuildError::Cancelled.kind(), ErrorKind::Cancelled);
        assert!(BuildError::Cancelled.is_cancelled());
        assert!(BuildError::Cancelled.path().is_none());
    }

    #[test]
    fn test_display_includes_path_and_cause() {
        let err = BuildError::output(
            Path::new("/out/image.iso"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let text = err.to_string();
        assert!(text.contains("/out/image.iso"));
        assert!(text.contains("denied"));
        assert_eq!(err.kind(), ErrorKind::OutputWriteError);
    }
}
