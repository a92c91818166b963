//! Image serialization
//!
//! File content is copied first, in manifest order, so that files which
//! fail to read can still be dropped from the directory records written
//! afterwards. Everything goes to a temporary file next to the output,
//! which is renamed into place only once the volume is complete.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::BLOCK_SIZE;
use super::descriptor::{joliet_descriptor, primary_descriptor, terminator};
use super::directory::{DirectoryEncoder, encode_path_table};
use super::layout::{FileExtent, ImageLayout, PVD_LBA};
use super::options::WriteOptions;
use crate::build::{
    BuildFailure, BuildReport, BuildResult, CancelToken, ProgressEvent, SkippedEntry,
};
use crate::error::{BuildError, Result};
use crate::naming::{VolumeLabel, normalize_label};
use crate::plan::{BuildManifest, EntryId, EntryKind, MAX_EXTENT_BYTES, SourceEntry};

const COPY_BUFFER: usize = 64 * 1024;

/// Write `manifest` as an ISO-9660 image at `output_path`
///
/// `on_progress` is called once per regular file, written or skipped.
/// On any error the partially written image is removed and `output_path`
/// is left untouched.
pub fn write_image<F>(
    manifest: &BuildManifest,
    output_path: &Path,
    volume_label: &str,
    options: &WriteOptions,
    mut on_progress: F,
    cancel: &CancelToken,
) -> BuildResult
where
    F: FnMut(ProgressEvent),
{
    let label = normalize_label(volume_label);
    let mut skipped = Vec::new();

    match write_volume(
        manifest,
        output_path,
        &label,
        options,
        &mut on_progress,
        cancel,
        &mut skipped,
    ) {
        Ok(image_blocks) => {
            let report = BuildReport {
                output_path: output_path.to_path_buf(),
                files_written: manifest.total_files - skipped.len(),
                skipped,
                warnings: manifest.warnings.clone(),
                image_blocks,
            };
            log::info!(
                "Wrote {} ({} files, {} skipped, {} blocks)",
                output_path.display(),
                report.files_written,
                report.skipped.len(),
                image_blocks
            );
            Ok(report)
        }
        Err(error) => {
            if error.is_cancelled() {
                log::info!("Build of {} cancelled", output_path.display());
            } else {
                log::error!("Build of {} failed: {}", output_path.display(), error);
            }
            Err(BuildFailure::new(error, skipped))
        }
    }
}

fn write_volume(
    manifest: &BuildManifest,
    output_path: &Path,
    label: &VolumeLabel,
    options: &WriteOptions,
    on_progress: &mut dyn FnMut(ProgressEvent),
    cancel: &CancelToken,
    skipped: &mut Vec<SkippedEntry>,
) -> Result<u32> {
    let layout = ImageLayout::plan(manifest, options.joliet, options.rock_ridge)?;
    if !options.rock_ridge {
        let symlinks = manifest
            .iter()
            .filter(|(_, e)| matches!(e.kind, EntryKind::Symlink { .. }))
            .count();
        if symlinks > 0 {
            log::debug!("Dropping {} symlinks, Rock Ridge is disabled", symlinks);
        }
    }
    log::info!(
        "Writing {} files ({} bytes) to {}",
        manifest.total_files,
        manifest.total_bytes,
        output_path.display()
    );

    let mut image = StagingFile::create(output_path)?;
    let mut buffer = vec![0u8; COPY_BUFFER];
    let mut skipped_ids = HashSet::new();
    let total = manifest.total_files;
    let mut processed = 0;

    for (id, entry) in manifest.files() {
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        let extent = layout.file(id).unwrap_or(FileExtent {
            lba: 0,
            size: entry.size(),
        });

        let mut written = 0u64;
        let copied = if extent.size > MAX_EXTENT_BYTES
            && !options.interchange_level.allows_multi_extent()
        {
            Err(BuildError::FileRead {
                path: entry.source_path.clone(),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "file needs multiple extents, which require interchange level 3",
                ),
            })
        } else {
            copy_file(entry, extent, &mut image, &mut buffer, &mut written)
        };

        match copied {
            Ok(()) => {}
            Err(error @ BuildError::FileRead { .. }) if options.skip_on_file_error => {
                log::warn!("Skipping {}: {}", entry.relative_path.display(), error);
                image.zero(extent.lba, written)?;
                skipped.push(SkippedEntry {
                    source_path: entry.source_path.clone(),
                    relative_path: entry.relative_path.clone(),
                    reason: error.to_string(),
                });
                skipped_ids.insert(id);
            }
            Err(error) => return Err(error),
        }

        processed += 1;
        on_progress(ProgressEvent::new(processed, total));
    }

    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled);
    }

    write_metadata(&mut image, manifest, &layout, label, options, &skipped_ids)?;
    image.commit(layout.total_blocks)?;
    Ok(layout.total_blocks)
}

/// Copy exactly the recorded size of `entry` to its extent
fn copy_file(
    entry: &SourceEntry,
    extent: FileExtent,
    image: &mut StagingFile,
    buffer: &mut [u8],
    written: &mut u64,
) -> Result<()> {
    if extent.size == 0 {
        // Still has to exist and be readable
        File::open(&entry.source_path).map_err(|e| read_error(entry, e))?;
        return Ok(());
    }

    let mut source = File::open(&entry.source_path).map_err(|e| read_error(entry, e))?;
    image.seek_to(extent.lba)?;

    let mut remaining = extent.size;
    while remaining > 0 {
        let want = remaining.min(buffer.len() as u64) as usize;
        let n = match source.read(&mut buffer[..want]) {
            Ok(0) => {
                return Err(read_error(
                    entry,
                    io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("file shrank by {} bytes since planning", remaining),
                    ),
                ));
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_error(entry, e)),
        };
        image.write(&buffer[..n])?;
        *written += n as u64;
        remaining -= n as u64;
    }
    Ok(())
}

fn read_error(entry: &SourceEntry, source: io::Error) -> BuildError {
    BuildError::FileRead {
        path: entry.source_path.clone(),
        source,
    }
}

fn write_metadata(
    image: &mut StagingFile,
    manifest: &BuildManifest,
    layout: &ImageLayout,
    label: &VolumeLabel,
    options: &WriteOptions,
    skipped: &HashSet<EntryId>,
) -> Result<()> {
    image.write_at(PVD_LBA, &primary_descriptor(manifest, layout, label, options))?;
    if let (Some(lba), Some(svd)) = (
        layout.svd_lba,
        joliet_descriptor(manifest, layout, label, options),
    ) {
        image.write_at(lba, &svd)?;
    }
    image.write_at(layout.terminator_lba, &terminator())?;

    for tree in layout.trees() {
        image.write_at(tree.path_table_l, &encode_path_table(tree, false))?;
        image.write_at(tree.path_table_m, &encode_path_table(tree, true))?;

        let encoder = DirectoryEncoder {
            manifest,
            tree,
            files: &layout.files,
            skipped,
        };
        for (i, slot) in tree.slots.iter().enumerate() {
            let encoded = encoder.encode(i);
            image.write_at(slot.lba, &encoded.records)?;
            if !encoded.continuation.is_empty() {
                image.write_at(slot.continuation_lba, &encoded.continuation)?;
            }
        }
    }
    Ok(())
}

/// Temporary image file in the output directory
///
/// Removed on drop unless committed.
struct StagingFile {
    file: File,
    temp_path: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagingFile {
    fn create(target: &Path) -> Result<Self> {
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.iso".to_string());
        let temp_path = dir.join(format!(".{}.{}.part", name, Uuid::new_v4()));

        let file = File::options()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(|e| BuildError::output(target, e))?;
        log::debug!("Staging image at {}", temp_path.display());

        Ok(Self {
            file,
            temp_path,
            target: target.to_path_buf(),
            committed: false,
        })
    }

    fn seek_to(&mut self, lba: u32) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(lba as u64 * BLOCK_SIZE as u64))
            .map(|_| ())
            .map_err(|e| BuildError::output(&self.target, e))
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.file
            .write_all(bytes)
            .map_err(|e| BuildError::output(&self.target, e))
    }

    fn write_at(&mut self, lba: u32, bytes: &[u8]) -> Result<()> {
        self.seek_to(lba)?;
        self.write(bytes)
    }

    /// Clear `len` bytes of a skipped file's extent
    fn zero(&mut self, lba: u32, len: u64) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        self.seek_to(lba)?;
        let zeros = vec![0u8; COPY_BUFFER];
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(COPY_BUFFER as u64) as usize;
            self.write(&zeros[..n])?;
            remaining -= n as u64;
        }
        Ok(())
    }

    fn commit(mut self, total_blocks: u32) -> Result<()> {
        self.file
            .set_len(total_blocks as u64 * BLOCK_SIZE as u64)
            .and_then(|_| self.file.sync_all())
            .map_err(|e| BuildError::output(&self.target, e))?;
        fs::rename(&self.temp_path, &self.target)
            .map_err(|e| BuildError::output(&self.target, e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if !self.committed
            && let Err(e) = fs::remove_file(&self.temp_path)
        {
            log::debug!("Could not remove {}: {}", self.temp_path.display(), e);
        }
    }
}
