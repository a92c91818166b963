//! Plan building - turns a source directory into an ordered manifest
//!
//! The manifest is immutable once built. The image writer only re-opens
//! file content by the recorded source path.

mod manifest;
mod scanning;

pub use manifest::{
    BuildManifest, EntryId, EntryKind, PosixMeta, S_IFDIR, S_IFLNK, S_IFREG, SourceEntry,
    WalkWarning, WarningReason,
};
pub use scanning::{MAX_EXTENT_BYTES, MAX_SYMLINK_TARGET, PlanOptions, SymlinkPolicy, build_plan};
