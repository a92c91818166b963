//! Source tree walking
//!
//! Builds a [`BuildManifest`] from a directory on disk. Traversal is sorted
//! by file name so that an unchanged tree always produces the same manifest.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::manifest::{
    BuildManifest, EntryId, EntryKind, ManifestBuilder, PosixMeta, SourceEntry, WalkWarning,
    WarningReason,
};
use crate::error::{BuildError, Result};
use crate::naming::{NameKind, Sanitizer, SiblingNames};

/// Largest file that fits in a single extent
pub const MAX_EXTENT_BYTES: u64 = u32::MAX as u64;
/// Longest symlink target kept when symlinks are recorded
pub const MAX_SYMLINK_TARGET: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymlinkPolicy {
    /// Leave symlinks out and record a warning
    #[default]
    Skip,
    /// Keep symlinks as entries so Rock Ridge can store their target
    Record,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    pub sanitizer: Sanitizer,
    pub symlinks: SymlinkPolicy,
}

/// Walk `source_root` and produce the ordered manifest
///
/// With `include_root`, everything is placed under one top-level directory
/// named after the source root.
pub fn build_plan(
    source_root: &Path,
    include_root: bool,
    options: &PlanOptions,
) -> Result<BuildManifest> {
    if !source_root.is_dir() {
        return Err(BuildError::NotADirectory {
            path: source_root.to_path_buf(),
        });
    }

    let root_meta = fs::metadata(source_root)
        .map(|m| PosixMeta::from_metadata(&m))
        .unwrap_or_else(|_| PosixMeta::directory_default());

    let mut builder = ManifestBuilder::new(source_root, root_meta);
    let mut siblings: HashMap<EntryId, SiblingNames> = HashMap::new();
    let mut warnings = Vec::new();

    let top = if include_root {
        let segment = root_segment(source_root);
        let name = sanitize(
            &options.sanitizer,
            &segment,
            NameKind::Directory,
            siblings.entry(EntryId::ROOT).or_default(),
            source_root,
        )?;
        builder.push(
            EntryId::ROOT,
            SourceEntry {
                source_path: source_root.to_path_buf(),
                relative_path: PathBuf::from(&segment),
                name,
                rr_name: segment,
                kind: EntryKind::Directory {
                    children: Vec::new(),
                },
                parent: None,
                meta: root_meta,
            },
        )
    } else {
        EntryId::ROOT
    };

    let mut dir_ids: HashMap<PathBuf, EntryId> = HashMap::new();
    dir_ids.insert(source_root.to_path_buf(), top);

    let mut walker = WalkDir::new(source_root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter();

    while let Some(item) = walker.next() {
        let entry = match item {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| source_root.to_path_buf());
                log::warn!("Skipping unreadable entry {}: {}", path.display(), e);
                warnings.push(WalkWarning {
                    path,
                    reason: WarningReason::Unreadable(e.to_string()),
                });
                continue;
            }
        };

        let path = entry.path();
        let Some(&parent) = path.parent().and_then(|p| dir_ids.get(p)) else {
            continue;
        };

        let file_type = entry.file_type();
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                log::warn!("Skipping {}: {}", path.display(), e);
                warnings.push(WalkWarning {
                    path: path.to_path_buf(),
                    reason: WarningReason::Unreadable(e.to_string()),
                });
                if file_type.is_dir() {
                    walker.skip_current_dir();
                }
                continue;
            }
        };

        let skip = |reason: WarningReason, warnings: &mut Vec<WalkWarning>| {
            log::warn!("Skipping {}: {}", path.display(), reason);
            warnings.push(WalkWarning {
                path: path.to_path_buf(),
                reason,
            });
        };

        let (name_kind, kind) = if file_type.is_dir() {
            (
                NameKind::Directory,
                EntryKind::Directory {
                    children: Vec::new(),
                },
            )
        } else if file_type.is_file() {
            let size = metadata.len();
            if size > MAX_EXTENT_BYTES && !options.sanitizer.level().allows_multi_extent() {
                skip(WarningReason::TooLarge { size }, &mut warnings);
                continue;
            }
            (NameKind::File, EntryKind::File { size })
        } else if file_type.is_symlink() {
            if options.symlinks == SymlinkPolicy::Skip {
                skip(WarningReason::Symlink, &mut warnings);
                continue;
            }
            let target = match fs::read_link(path) {
                Ok(target) => target,
                Err(e) => {
                    skip(WarningReason::Unreadable(e.to_string()), &mut warnings);
                    continue;
                }
            };
            let len = target.as_os_str().len();
            if len > MAX_SYMLINK_TARGET {
                skip(WarningReason::SymlinkTargetTooLong { len }, &mut warnings);
                continue;
            }
            (NameKind::File, EntryKind::Symlink { target })
        } else {
            skip(WarningReason::SpecialFile, &mut warnings);
            continue;
        };

        let segment = entry.file_name().to_string_lossy().into_owned();
        let parent_entry = builder.entry(parent);
        let parent_path = parent_entry.source_path.clone();
        let relative_path = parent_entry.relative_path.join(&segment);
        let name = sanitize(
            &options.sanitizer,
            &segment,
            name_kind,
            siblings.entry(parent).or_default(),
            &parent_path,
        )?;

        let is_dir = matches!(kind, EntryKind::Directory { .. });
        let id = builder.push(
            parent,
            SourceEntry {
                source_path: path.to_path_buf(),
                relative_path,
                name,
                rr_name: segment,
                kind,
                parent: None,
                meta: PosixMeta::from_metadata(&metadata),
            },
        );
        if is_dir {
            dir_ids.insert(path.to_path_buf(), id);
        }
    }

    let manifest = builder.finish(warnings);
    log::info!(
        "Planned {} files ({} bytes) in {} entries from {}",
        manifest.total_files,
        manifest.total_bytes,
        manifest.len(),
        source_root.display()
    );
    Ok(manifest)
}

/// Base name of the source root, resolving `.` and similar paths
fn root_segment(source_root: &Path) -> String {
    source_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .or_else(|| {
            fs::canonicalize(source_root)
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        })
        .unwrap_or_default()
}

fn sanitize(
    sanitizer: &Sanitizer,
    segment: &str,
    kind: NameKind,
    siblings: &mut SiblingNames,
    parent: &Path,
) -> Result<crate::naming::TargetName> {
    sanitizer
        .sanitize(segment, kind, siblings)
        .map_err(|collision| BuildError::NameCollisionUnresolved {
            parent: parent.to_path_buf(),
            name: collision.name,
        })
}
