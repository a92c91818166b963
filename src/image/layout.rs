//! Block allocation for the whole volume
//!
//! Regions are handed out from a running block counter in a fixed order:
//! system area, descriptors, path tables, primary directories (each with
//! its Rock Ridge continuation area), Joliet directories, file content.

use std::collections::{HashMap, HashSet, VecDeque};

use super::BLOCK_SIZE;
use super::directory::{DirectoryEncoder, ecma_order, joliet_order, path_table_record_len};
use super::encoding::ucs2_be;
use crate::error::{BuildError, Result};
use crate::plan::{BuildManifest, EntryId, EntryKind, SourceEntry};

/// Blocks 0-15 are reserved
pub(crate) const SYSTEM_AREA_BLOCKS: u32 = 16;
pub(crate) const PVD_LBA: u32 = SYSTEM_AREA_BLOCKS;
/// Path table records are numbered from 1 with 16-bit parent numbers
pub(crate) const MAX_DIRECTORIES: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Namespace {
    Primary,
    Joliet,
}

impl Namespace {
    fn includes(self, entry: &SourceEntry, rock_ridge: bool) -> bool {
        match entry.kind {
            EntryKind::Symlink { .. } => self == Namespace::Primary && rock_ridge,
            _ => true,
        }
    }

    /// Identifier used in a directory record
    pub fn record_identifier(self, entry: &SourceEntry) -> Vec<u8> {
        match (self, entry.is_dir()) {
            (Namespace::Primary, true) => entry.name.iso9660.as_bytes().to_vec(),
            (Namespace::Primary, false) => {
                let name = &entry.name.iso9660;
                if name.contains('.') {
                    format!("{};1", name).into_bytes()
                } else {
                    format!("{}.;1", name).into_bytes()
                }
            }
            (Namespace::Joliet, true) => ucs2_be(&entry.name.joliet),
            (Namespace::Joliet, false) => ucs2_be(&format!("{};1", entry.name.joliet)),
        }
    }

    fn order(self, a: &SourceEntry, b: &SourceEntry) -> std::cmp::Ordering {
        match self {
            Namespace::Primary => ecma_order(&a.name.iso9660, &b.name.iso9660),
            Namespace::Joliet => joliet_order(&a.name.joliet, &b.name.joliet),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DirSlot {
    pub entry: EntryId,
    /// Slot index of the parent; the root is its own parent
    pub parent: usize,
    /// Path table identifier
    pub identifier: Vec<u8>,
    /// Children present in this namespace, in record order
    pub children: Vec<EntryId>,
    pub subdirectories: u32,
    pub lba: u32,
    pub size: u32,
    pub continuation_lba: u32,
    pub continuation_size: u32,
}

/// Directory hierarchy of one namespace, in path table order
#[derive(Debug, Clone)]
pub(crate) struct NamespaceTree {
    pub namespace: Namespace,
    /// Whether records carry Rock Ridge entries
    pub rock_ridge: bool,
    pub slots: Vec<DirSlot>,
    index: HashMap<EntryId, usize>,
    pub path_table_size: u32,
    pub path_table_l: u32,
    pub path_table_m: u32,
}

impl NamespaceTree {
    fn new(manifest: &BuildManifest, namespace: Namespace, rock_ridge: bool) -> Self {
        let mut slots = Vec::new();
        let mut index = HashMap::new();
        let mut queue = VecDeque::from([(EntryId::ROOT, 0usize)]);

        while let Some((id, parent)) = queue.pop_front() {
            let entry = manifest.entry(id);
            let mut children: Vec<EntryId> = entry
                .children()
                .iter()
                .copied()
                .filter(|&c| namespace.includes(manifest.entry(c), rock_ridge))
                .collect();
            children.sort_by(|&a, &b| namespace.order(manifest.entry(a), manifest.entry(b)));

            let slot_index = slots.len();
            let subdirs: Vec<EntryId> = children
                .iter()
                .copied()
                .filter(|&c| manifest.entry(c).is_dir())
                .collect();
            for &dir in &subdirs {
                queue.push_back((dir, slot_index));
            }

            let identifier = if id == EntryId::ROOT {
                vec![0]
            } else {
                match namespace {
                    Namespace::Primary => entry.name.iso9660.as_bytes().to_vec(),
                    Namespace::Joliet => ucs2_be(&entry.name.joliet),
                }
            };

            index.insert(id, slot_index);
            slots.push(DirSlot {
                entry: id,
                parent,
                identifier,
                children,
                subdirectories: subdirs.len() as u32,
                lba: 0,
                size: 0,
                continuation_lba: 0,
                continuation_size: 0,
            });
        }

        let path_table_size = slots
            .iter()
            .map(|s| path_table_record_len(s.identifier.len()))
            .sum::<usize>() as u32;

        Self {
            namespace,
            rock_ridge: rock_ridge && namespace == Namespace::Primary,
            slots,
            index,
            path_table_size,
            path_table_l: 0,
            path_table_m: 0,
        }
    }

    pub fn slot_of(&self, id: EntryId) -> Option<&DirSlot> {
        self.index.get(&id).map(|&i| &self.slots[i])
    }

    pub fn root(&self) -> &DirSlot {
        &self.slots[0]
    }

    /// Blocks of the two path tables
    fn allocate_path_tables(&mut self, allocator: &mut Allocator) {
        self.path_table_l = allocator.take(self.path_table_size as u64);
        self.path_table_m = allocator.take(self.path_table_size as u64);
    }

    /// Size every directory with placeholder locations, then place them
    fn allocate_directories(&mut self, manifest: &BuildManifest, allocator: &mut Allocator) {
        let placeholder = vec![None; manifest.len()];
        let none = HashSet::new();
        let sizes: Vec<(usize, usize)> = {
            let encoder = DirectoryEncoder {
                manifest,
                tree: self,
                files: &placeholder,
                skipped: &none,
            };
            (0..self.slots.len())
                .map(|i| {
                    let encoded = encoder.encode(i);
                    (encoded.records.len(), encoded.continuation.len())
                })
                .collect()
        };

        for (slot, (records, continuation)) in self.slots.iter_mut().zip(sizes) {
            slot.size = records as u32;
            slot.lba = allocator.take(records as u64);
            if continuation > 0 {
                slot.continuation_size = continuation as u32;
                slot.continuation_lba = allocator.take(continuation as u64);
            }
        }
    }
}

/// The Joliet tree never holds more directories than the primary one
fn check_directory_count(count: usize) -> Result<()> {
    if count > MAX_DIRECTORIES {
        return Err(BuildError::TooManyDirectories { count });
    }
    Ok(())
}

/// Running block counter
#[derive(Debug)]
pub(crate) struct Allocator {
    next: u32,
}

impl Allocator {
    pub fn new(first: u32) -> Self {
        Self { next: first }
    }

    /// Reserve whole blocks for `bytes`, returning the first block
    pub fn take(&mut self, bytes: u64) -> u32 {
        let lba = self.next;
        self.next += bytes.div_ceil(BLOCK_SIZE as u64) as u32;
        lba
    }

    pub fn next(&self) -> u32 {
        self.next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileExtent {
    pub lba: u32,
    pub size: u64,
}

/// Where everything goes
#[derive(Debug, Clone)]
pub(crate) struct ImageLayout {
    pub svd_lba: Option<u32>,
    pub terminator_lba: u32,
    pub primary: NamespaceTree,
    pub joliet: Option<NamespaceTree>,
    /// Indexed by entry, `Some` for regular files
    pub files: Vec<Option<FileExtent>>,
    pub total_blocks: u32,
}

impl ImageLayout {
    pub fn plan(manifest: &BuildManifest, joliet: bool, rock_ridge: bool) -> Result<Self> {
        let mut allocator = Allocator::new(PVD_LBA + 1);
        let svd_lba = joliet.then(|| allocator.take(BLOCK_SIZE as u64));
        let terminator_lba = allocator.take(BLOCK_SIZE as u64);

        let mut primary = NamespaceTree::new(manifest, Namespace::Primary, rock_ridge);
        check_directory_count(primary.slots.len())?;
        let mut joliet_tree =
            joliet.then(|| NamespaceTree::new(manifest, Namespace::Joliet, false));

        primary.allocate_path_tables(&mut allocator);
        if let Some(tree) = joliet_tree.as_mut() {
            tree.allocate_path_tables(&mut allocator);
        }
        primary.allocate_directories(manifest, &mut allocator);
        if let Some(tree) = joliet_tree.as_mut() {
            tree.allocate_directories(manifest, &mut allocator);
        }

        let mut files = vec![None; manifest.len()];
        for (id, entry) in manifest.files() {
            let size = entry.size();
            let lba = if size == 0 { 0 } else { allocator.take(size) };
            files[id.index()] = Some(FileExtent { lba, size });
        }

        let total_blocks = allocator.next();
        log::debug!(
            "Layout: {} primary dirs, {} joliet dirs, {} blocks",
            primary.slots.len(),
            joliet_tree.as_ref().map_or(0, |t| t.slots.len()),
            total_blocks
        );

        Ok(Self {
            svd_lba,
            terminator_lba,
            primary,
            joliet: joliet_tree,
            files,
            total_blocks,
        })
    }

    pub fn file(&self, id: EntryId) -> Option<FileExtent> {
        self.files.get(id.index()).copied().flatten()
    }

    pub fn trees(&self) -> impl Iterator<Item = &NamespaceTree> {
        std::iter::once(&self.primary).chain(self.joliet.as_ref())
    }
}
