//! Directory records, directory extents and path tables

use std::cmp::Ordering;
use std::collections::HashSet;

use super::BLOCK_SIZE;
use super::encoding::{both_u16, both_u32, record_datetime};
use super::layout::{FileExtent, NamespaceTree};
use super::rock_ridge::{self, ContinuationArea, present};
use crate::plan::{BuildManifest, EntryId, EntryKind, PosixMeta};

pub(crate) const FLAG_DIRECTORY: u8 = 0x02;
pub(crate) const FLAG_MULTI_EXTENT: u8 = 0x80;

/// Largest block-aligned extent of a multi-extent file
pub(crate) const MAX_EXTENT_CHUNK: u64 = 0xFFFF_F800;

const RECORD_HEADER: usize = 33;
const MAX_RECORD: usize = 254;

/// Identifier of the `.` record
pub(crate) const SELF_IDENTIFIER: &[u8] = &[0x00];
/// Identifier of the `..` record
pub(crate) const PARENT_IDENTIFIER: &[u8] = &[0x01];

pub(crate) struct RecordSpec<'a> {
    pub identifier: &'a [u8],
    pub lba: u32,
    pub size: u32,
    pub flags: u8,
    pub date: [u8; 7],
    pub system_use: &'a [u8],
}

fn identifier_pad(identifier_len: usize) -> usize {
    if identifier_len % 2 == 0 { 1 } else { 0 }
}

/// System Use bytes left in a record carrying `identifier_len` bytes of name
pub(crate) fn system_use_space(identifier_len: usize) -> usize {
    MAX_RECORD.saturating_sub(RECORD_HEADER + identifier_len + identifier_pad(identifier_len))
}

pub(crate) fn encode_record(spec: &RecordSpec) -> Vec<u8> {
    let id_len = spec.identifier.len();
    let mut out = Vec::with_capacity(RECORD_HEADER + id_len + 1 + spec.system_use.len() + 1);
    out.push(0); // length, patched below
    out.push(0); // extended attribute record length
    out.extend_from_slice(&both_u32(spec.lba));
    out.extend_from_slice(&both_u32(spec.size));
    out.extend_from_slice(&spec.date);
    out.push(spec.flags);
    out.push(0); // file unit size
    out.push(0); // interleave gap
    out.extend_from_slice(&both_u16(1)); // volume sequence number
    out.push(id_len as u8);
    out.extend_from_slice(spec.identifier);
    if identifier_pad(id_len) == 1 {
        out.push(0);
    }
    out.extend_from_slice(spec.system_use);
    if out.len() % 2 == 1 {
        out.push(0);
    }
    out[0] = out.len() as u8;
    out
}

/// Packs records into whole blocks
///
/// A record never crosses a block boundary and the output is at least one
/// block long.
#[derive(Debug, Default)]
pub(crate) struct SectorWriter {
    bytes: Vec<u8>,
}

impl SectorWriter {
    pub fn push(&mut self, record: &[u8]) {
        let used = self.bytes.len() % BLOCK_SIZE;
        if used != 0 && used + record.len() > BLOCK_SIZE {
            let padded = self.bytes.len() + (BLOCK_SIZE - used);
            self.bytes.resize(padded, 0);
        }
        self.bytes.extend_from_slice(record);
    }

    pub fn finish(mut self) -> Vec<u8> {
        let blocks = self.bytes.len().div_ceil(BLOCK_SIZE).max(1);
        self.bytes.resize(blocks * BLOCK_SIZE, 0);
        self.bytes
    }
}

/// ECMA-119 ordering: name, then extension, each padded with spaces
pub(crate) fn ecma_order(a: &str, b: &str) -> Ordering {
    let split = |s: &str| -> (Vec<u8>, Vec<u8>) {
        match s.rsplit_once('.') {
            Some((stem, ext)) => (stem.as_bytes().to_vec(), ext.as_bytes().to_vec()),
            None => (s.as_bytes().to_vec(), Vec::new()),
        }
    };
    let (a_stem, a_ext) = split(a);
    let (b_stem, b_ext) = split(b);
    padded_cmp(&a_stem, &b_stem).then_with(|| padded_cmp(&a_ext, &b_ext))
}

fn padded_cmp(a: &[u8], b: &[u8]) -> Ordering {
    let len = a.len().max(b.len());
    let pad = |s: &[u8]| {
        s.iter()
            .copied()
            .chain(std::iter::repeat(b' '))
            .take(len)
            .collect::<Vec<u8>>()
    };
    pad(a).cmp(&pad(b))
}

/// Joliet ordering: UCS-2 big-endian code units
pub(crate) fn joliet_order(a: &str, b: &str) -> Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

/// `(lba, length)` of each extent of a file starting at `lba`
pub(crate) fn split_extents(lba: u32, size: u64) -> Vec<(u32, u32)> {
    if size == 0 {
        return vec![(lba, 0)];
    }
    let mut extents = Vec::new();
    let mut remaining = size;
    let mut next = lba;
    while remaining > 0 {
        let len = remaining.min(MAX_EXTENT_CHUNK);
        extents.push((next, len as u32));
        next += (len / BLOCK_SIZE as u64) as u32;
        remaining -= len;
    }
    extents
}

/// Path table for `tree`, little-endian (type L) or big-endian (type M)
pub(crate) fn encode_path_table(tree: &NamespaceTree, big_endian: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(tree.path_table_size as usize);
    for slot in &tree.slots {
        let id = &slot.identifier;
        out.push(id.len() as u8);
        out.push(0);
        let parent = (slot.parent + 1) as u16;
        if big_endian {
            out.extend_from_slice(&slot.lba.to_be_bytes());
            out.extend_from_slice(&parent.to_be_bytes());
        } else {
            out.extend_from_slice(&slot.lba.to_le_bytes());
            out.extend_from_slice(&parent.to_le_bytes());
        }
        out.extend_from_slice(id);
        if id.len() % 2 == 1 {
            out.push(0);
        }
    }
    out
}

/// Byte size of one path table record
pub(crate) fn path_table_record_len(identifier_len: usize) -> usize {
    8 + identifier_len + identifier_len % 2
}

#[derive(Debug, Default)]
pub(crate) struct EncodedDirectory {
    /// Whole blocks of directory records
    pub records: Vec<u8>,
    /// Rock Ridge overflow, written at the slot's continuation block
    pub continuation: Vec<u8>,
}

/// Encodes directory extents for one namespace
///
/// Record lengths never depend on locations, so the same encoder sizes
/// directories before allocation and emits them afterwards.
pub(crate) struct DirectoryEncoder<'a> {
    pub manifest: &'a BuildManifest,
    pub tree: &'a NamespaceTree,
    pub files: &'a [Option<FileExtent>],
    pub skipped: &'a HashSet<EntryId>,
}

impl DirectoryEncoder<'_> {
    pub fn encode(&self, slot_index: usize) -> EncodedDirectory {
        let slot = &self.tree.slots[slot_index];
        let parent = &self.tree.slots[slot.parent];
        let mut sectors = SectorWriter::default();
        let mut area = ContinuationArea::default();
        let mut out = RecordSink {
            sectors: &mut sectors,
            area: &mut area,
            area_lba: slot.continuation_lba,
            rock_ridge: self.tree.rock_ridge,
        };

        let this = self.manifest.entry(slot.entry);
        let mut su = vec![
            rock_ridge::rr(present::PX | present::TF),
            rock_ridge::px(&this.meta, 2 + slot.subdirectories),
            rock_ridge::tf(this.meta.mtime),
        ];
        let mut spill = Vec::new();
        if slot_index == 0 {
            su.insert(0, rock_ridge::sp());
            spill.push(rock_ridge::er());
        }
        out.push(
            SELF_IDENTIFIER,
            slot.lba,
            slot.size,
            FLAG_DIRECTORY,
            &this.meta,
            su,
            spill,
        );

        let up = self.manifest.entry(parent.entry);
        let su = vec![
            rock_ridge::rr(present::PX | present::TF),
            rock_ridge::px(&up.meta, 2 + parent.subdirectories),
            rock_ridge::tf(up.meta.mtime),
        ];
        out.push(
            PARENT_IDENTIFIER,
            parent.lba,
            parent.size,
            FLAG_DIRECTORY,
            &up.meta,
            su,
            Vec::new(),
        );

        for &child in &slot.children {
            if self.skipped.contains(&child) {
                continue;
            }
            let entry = self.manifest.entry(child);
            let identifier = self.tree.namespace.record_identifier(entry);
            let mut rr_flags = present::PX | present::TF | present::NM;
            let mut tail = rock_ridge::nm(&entry.rr_name);

            match &entry.kind {
                EntryKind::Directory { .. } => {
                    let Some(child_slot) = self.tree.slot_of(child) else {
                        continue;
                    };
                    let mut su = vec![
                        rock_ridge::rr(rr_flags),
                        rock_ridge::px(&entry.meta, 2 + child_slot.subdirectories),
                        rock_ridge::tf(entry.meta.mtime),
                    ];
                    su.append(&mut tail);
                    out.push(
                        &identifier,
                        child_slot.lba,
                        child_slot.size,
                        FLAG_DIRECTORY,
                        &entry.meta,
                        su,
                        Vec::new(),
                    );
                }
                EntryKind::File { size } => {
                    let lba = self.files[child.index()].map(|f| f.lba).unwrap_or(0);
                    let extents = split_extents(lba, *size);
                    let last = extents.len() - 1;
                    for (i, (extent_lba, extent_len)) in extents.into_iter().enumerate() {
                        let mut su = vec![
                            rock_ridge::rr(rr_flags),
                            rock_ridge::px(&entry.meta, 1),
                            rock_ridge::tf(entry.meta.mtime),
                        ];
                        su.extend(tail.iter().cloned());
                        let flags = if i < last { FLAG_MULTI_EXTENT } else { 0 };
                        out.push(
                            &identifier,
                            extent_lba,
                            extent_len,
                            flags,
                            &entry.meta,
                            su,
                            Vec::new(),
                        );
                    }
                }
                EntryKind::Symlink { target } => {
                    rr_flags |= present::SL;
                    let mut su = vec![
                        rock_ridge::rr(rr_flags),
                        rock_ridge::px(&entry.meta, 1),
                        rock_ridge::tf(entry.meta.mtime),
                    ];
                    su.append(&mut tail);
                    su.extend(rock_ridge::sl(target));
                    out.push(&identifier, 0, 0, 0, &entry.meta, su, Vec::new());
                }
            }
        }

        EncodedDirectory {
            records: sectors.finish(),
            continuation: area.into_bytes(),
        }
    }
}

struct RecordSink<'a> {
    sectors: &'a mut SectorWriter,
    area: &'a mut ContinuationArea,
    area_lba: u32,
    rock_ridge: bool,
}

impl RecordSink<'_> {
    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        identifier: &[u8],
        lba: u32,
        size: u32,
        flags: u8,
        meta: &PosixMeta,
        su: Vec<Vec<u8>>,
        spill: Vec<Vec<u8>>,
    ) {
        let system_use = if self.rock_ridge {
            rock_ridge::pack_system_use(
                su,
                spill,
                system_use_space(identifier.len()),
                self.area,
                self.area_lba,
            )
        } else {
            Vec::new()
        };
        self.sectors.push(&encode_record(&RecordSpec {
            identifier,
            lba,
            size,
            flags,
            date: record_datetime(meta.mtime),
            system_use: &system_use,
        }));
    }
}
