//! Build manifest types
//!
//! Entries live in an arena indexed by [`EntryId`]; entry 0 is the image
//! root. Vector order is pre-order over the source tree, which is the
//! order file content is laid out and copied in.

use std::fmt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use crate::naming::TargetName;

pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFLNK: u32 = 0o120000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub usize);

impl EntryId {
    pub const ROOT: EntryId = EntryId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File { size: u64 },
    Directory { children: Vec<EntryId> },
    /// Only present when symlinks are recorded rather than skipped
    Symlink { target: PathBuf },
}

/// POSIX attributes carried into Rock Ridge records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosixMeta {
    /// Full `st_mode`, file type bits included
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Modification time, seconds since the Unix epoch
    pub mtime: i64,
}

impl PosixMeta {
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            mode: metadata.mode(),
            uid: metadata.uid(),
            gid: metadata.gid(),
            mtime: metadata.mtime(),
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let file_type = metadata.file_type();
        let mode = if file_type.is_dir() {
            S_IFDIR | 0o555
        } else if file_type.is_symlink() {
            S_IFLNK | 0o777
        } else {
            S_IFREG | 0o444
        };
        Self {
            mode,
            uid: 0,
            gid: 0,
            mtime,
        }
    }

    /// Attributes for a directory whose metadata could not be read
    pub fn directory_default() -> Self {
        Self {
            mode: S_IFDIR | 0o555,
            uid: 0,
            gid: 0,
            mtime: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub source_path: PathBuf,
    /// Path inside the image, in original spelling. Empty for the root.
    pub relative_path: PathBuf,
    pub name: TargetName,
    /// Original segment, stored as the Rock Ridge name
    pub rr_name: String,
    pub kind: EntryKind,
    pub parent: Option<EntryId>,
    pub meta: PosixMeta,
}

impl SourceEntry {
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File { .. })
    }

    /// Byte size for regular files, zero otherwise
    pub fn size(&self) -> u64 {
        match self.kind {
            EntryKind::File { size } => size,
            _ => 0,
        }
    }

    pub fn children(&self) -> &[EntryId] {
        match &self.kind {
            EntryKind::Directory { children } => children,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningReason {
    Symlink,
    SpecialFile,
    Unreadable(String),
    TooLarge { size: u64 },
    SymlinkTargetTooLong { len: usize },
}

impl fmt::Display for WarningReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningReason::Symlink => write!(f, "symbolic link skipped"),
            WarningReason::SpecialFile => write!(f, "special file skipped"),
            WarningReason::Unreadable(e) => write!(f, "unreadable: {}", e),
            WarningReason::TooLarge { size } => {
                write!(f, "{} bytes exceeds the single extent limit", size)
            }
            WarningReason::SymlinkTargetTooLong { len } => {
                write!(f, "symlink target of {} bytes is too long", len)
            }
        }
    }
}

/// Something the walker left out of the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkWarning {
    pub path: PathBuf,
    pub reason: WarningReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildManifest {
    entries: Vec<SourceEntry>,
    pub total_files: usize,
    pub total_bytes: u64,
    pub warnings: Vec<WalkWarning>,
}

impl BuildManifest {
    pub fn root(&self) -> &SourceEntry {
        &self.entries[EntryId::ROOT.index()]
    }

    pub fn entry(&self, id: EntryId) -> &SourceEntry {
        &self.entries[id.index()]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// All entries in manifest order, root first
    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &SourceEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (EntryId(i), entry))
    }

    /// Regular files in manifest order
    pub fn files(&self) -> impl Iterator<Item = (EntryId, &SourceEntry)> {
        self.iter().filter(|(_, entry)| entry.is_file())
    }

    /// Look up an entry by its path inside the image
    pub fn find(&self, relative_path: &Path) -> Option<EntryId> {
        self.iter()
            .find(|(_, entry)| entry.relative_path == relative_path)
            .map(|(id, _)| id)
    }
}

/// Accumulates entries while the walker runs
pub(crate) struct ManifestBuilder {
    entries: Vec<SourceEntry>,
    total_files: usize,
    total_bytes: u64,
}

impl ManifestBuilder {
    pub fn new(source_root: &Path, meta: PosixMeta) -> Self {
        let root = SourceEntry {
            source_path: source_root.to_path_buf(),
            relative_path: PathBuf::new(),
            name: TargetName {
                iso9660: String::new(),
                joliet: String::new(),
            },
            rr_name: String::new(),
            kind: EntryKind::Directory {
                children: Vec::new(),
            },
            parent: None,
            meta,
        };
        Self {
            entries: vec![root],
            total_files: 0,
            total_bytes: 0,
        }
    }

    pub fn entry(&self, id: EntryId) -> &SourceEntry {
        &self.entries[id.index()]
    }

    /// Append `entry` as the last child of `parent`
    pub fn push(&mut self, parent: EntryId, mut entry: SourceEntry) -> EntryId {
        let id = EntryId(self.entries.len());
        entry.parent = Some(parent);
        if let EntryKind::File { size } = entry.kind {
            self.total_files += 1;
            self.total_bytes += size;
        }
        self.entries.push(entry);
        if let EntryKind::Directory { children } = &mut self.entries[parent.index()].kind {
            children.push(id);
        }
        id
    }

    pub fn finish(self, warnings: Vec<WalkWarning>) -> BuildManifest {
        BuildManifest {
            entries: self.entries,
            total_files: self.total_files,
            total_bytes: self.total_bytes,
            warnings,
        }
    }
}
