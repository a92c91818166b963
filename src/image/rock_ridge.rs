//! Rock Ridge 1.09 System Use entries
//!
//! Entries are built as plain byte vectors and packed into a directory
//! record's System Use area. Anything that does not fit is moved to the
//! directory's continuation area behind a `CE` entry.

use std::path::{Component, Path};

use super::BLOCK_SIZE;
use super::encoding::{both_u32, record_datetime};
use crate::plan::PosixMeta;

/// Signature constants
pub(crate) mod signatures {
    pub const SHARING_PROTOCOL: &[u8; 2] = b"SP";
    pub const CONTINUATION: &[u8; 2] = b"CE";
    pub const EXTENSION_REFERENCE: &[u8; 2] = b"ER";
    pub const ROCK_RIDGE: &[u8; 2] = b"RR";
    pub const POSIX_ATTRS: &[u8; 2] = b"PX";
    pub const TIMESTAMPS: &[u8; 2] = b"TF";
    pub const ALTERNATE_NAME: &[u8; 2] = b"NM";
    pub const SYMLINK: &[u8; 2] = b"SL";
}

/// Flags of the `RR` entry naming which entries follow
pub(crate) mod present {
    pub const PX: u8 = 0x01;
    pub const SL: u8 = 0x04;
    pub const NM: u8 = 0x08;
    pub const TF: u8 = 0x80;
}

const ENTRY_VERSION: u8 = 1;
const ENTRY_HEADER: usize = 4;
const MAX_ENTRY: usize = 255;

pub(crate) const CE_LEN: usize = 28;
/// Name bytes per `NM` entry
const NM_CHUNK: usize = MAX_ENTRY - ENTRY_HEADER - 1;
/// Content bytes per `SL` component record
const SL_COMPONENT_CHUNK: usize = MAX_ENTRY - ENTRY_HEADER - 1 - 2;

const CONTINUE: u8 = 0x01;
const SL_CURRENT: u8 = 0x02;
const SL_PARENT: u8 = 0x04;
const SL_ROOT: u8 = 0x08;

const TF_MODIFY: u8 = 0x02;
const TF_ACCESS: u8 = 0x04;

const ER_IDENTIFIER: &str = "RRIP_1991A";
const ER_DESCRIPTOR: &str =
    "THE ROCK RIDGE INTERCHANGE PROTOCOL PROVIDES SUPPORT FOR POSIX FILE SYSTEM SEMANTICS";
const ER_SOURCE: &str = "PLEASE CONTACT DISC PUBLISHER FOR SPECIFICATION SOURCE.  \
SEE PUBLISHER IDENTIFIER IN PRIMARY VOLUME DESCRIPTOR FOR CONTACT INFORMATION.";

fn entry(signature: &[u8; 2], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ENTRY_HEADER + data.len());
    out.extend_from_slice(signature);
    out.push((ENTRY_HEADER + data.len()) as u8);
    out.push(ENTRY_VERSION);
    out.extend_from_slice(data);
    out
}

/// `SP`, first entry of the root's `.` record
pub(crate) fn sp() -> Vec<u8> {
    entry(signatures::SHARING_PROTOCOL, &[0xBE, 0xEF, 0])
}

pub(crate) fn rr(flags: u8) -> Vec<u8> {
    entry(signatures::ROCK_RIDGE, &[flags])
}

pub(crate) fn px(meta: &PosixMeta, links: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(32);
    data.extend_from_slice(&both_u32(meta.mode));
    data.extend_from_slice(&both_u32(links));
    data.extend_from_slice(&both_u32(meta.uid));
    data.extend_from_slice(&both_u32(meta.gid));
    entry(signatures::POSIX_ATTRS, &data)
}

/// Modify and access stamps, both taken from the entry's mtime
pub(crate) fn tf(mtime: i64) -> Vec<u8> {
    let stamp = record_datetime(mtime);
    let mut data = vec![TF_MODIFY | TF_ACCESS];
    data.extend_from_slice(&stamp);
    data.extend_from_slice(&stamp);
    entry(signatures::TIMESTAMPS, &data)
}

/// One or more `NM` entries; all but the last carry the CONTINUE flag
pub(crate) fn nm(name: &str) -> Vec<Vec<u8>> {
    let bytes = name.as_bytes();
    let chunks: Vec<&[u8]> = bytes.chunks(NM_CHUNK).collect();
    let last = chunks.len().saturating_sub(1);
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let flags = if i < last { CONTINUE } else { 0 };
            let mut data = vec![flags];
            data.extend_from_slice(chunk);
            entry(signatures::ALTERNATE_NAME, &data)
        })
        .collect()
}

/// Symlink target as `SL` entries holding component records
pub(crate) fn sl(target: &Path) -> Vec<Vec<u8>> {
    let mut components: Vec<Vec<u8>> = Vec::new();
    for component in target.components() {
        match component {
            Component::RootDir => components.push(vec![SL_ROOT, 0]),
            Component::CurDir => components.push(vec![SL_CURRENT, 0]),
            Component::ParentDir => components.push(vec![SL_PARENT, 0]),
            Component::Normal(part) => {
                let part = part.to_string_lossy();
                let pieces: Vec<&[u8]> = part.as_bytes().chunks(SL_COMPONENT_CHUNK).collect();
                let last = pieces.len().saturating_sub(1);
                for (i, piece) in pieces.iter().enumerate() {
                    let flags = if i < last { CONTINUE } else { 0 };
                    let mut record = vec![flags, piece.len() as u8];
                    record.extend_from_slice(piece);
                    components.push(record);
                }
            }
            Component::Prefix(_) => {}
        }
    }

    let mut groups: Vec<Vec<u8>> = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    for record in components {
        if !current.is_empty() && ENTRY_HEADER + 1 + current.len() + record.len() > MAX_ENTRY {
            groups.push(std::mem::take(&mut current));
        }
        current.extend_from_slice(&record);
    }
    groups.push(current);

    let last = groups.len() - 1;
    groups
        .iter()
        .enumerate()
        .map(|(i, records)| {
            let flags = if i < last { CONTINUE } else { 0 };
            let mut data = vec![flags];
            data.extend_from_slice(records);
            entry(signatures::SYMLINK, &data)
        })
        .collect()
}

pub(crate) fn ce(block: u32, offset: u32, length: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(24);
    data.extend_from_slice(&both_u32(block));
    data.extend_from_slice(&both_u32(offset));
    data.extend_from_slice(&both_u32(length));
    entry(signatures::CONTINUATION, &data)
}

/// `ER` naming the Rock Ridge version in use
pub(crate) fn er() -> Vec<u8> {
    let mut data = vec![
        ER_IDENTIFIER.len() as u8,
        ER_DESCRIPTOR.len() as u8,
        ER_SOURCE.len() as u8,
        1,
    ];
    data.extend_from_slice(ER_IDENTIFIER.as_bytes());
    data.extend_from_slice(ER_DESCRIPTOR.as_bytes());
    data.extend_from_slice(ER_SOURCE.as_bytes());
    entry(signatures::EXTENSION_REFERENCE, &data)
}

/// Overflow storage for one directory
///
/// A chunk never crosses a block boundary.
#[derive(Debug, Default)]
pub(crate) struct ContinuationArea {
    bytes: Vec<u8>,
}

impl ContinuationArea {
    /// Append `chunk`, returning its byte offset inside the area
    pub fn push(&mut self, chunk: &[u8]) -> usize {
        let used = self.bytes.len() % BLOCK_SIZE;
        if used != 0 && used + chunk.len() > BLOCK_SIZE {
            let padded = self.bytes.len() + (BLOCK_SIZE - used);
            self.bytes.resize(padded, 0);
        }
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(chunk);
        offset
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Lay out `entries` in a record's System Use area of `available` bytes
///
/// Entries are kept in order. When they do not all fit, or when `spill` is
/// non-empty, the tail goes to `area` followed by `spill`, and a `CE`
/// pointing at it closes the inline part.
pub(crate) fn pack_system_use(
    entries: Vec<Vec<u8>>,
    spill: Vec<Vec<u8>>,
    available: usize,
    area: &mut ContinuationArea,
    area_lba: u32,
) -> Vec<u8> {
    let total: usize = entries.iter().map(Vec::len).sum();
    if spill.is_empty() && total <= available {
        return entries.concat();
    }

    let mut inline = Vec::new();
    let mut overflow = Vec::new();
    for e in entries {
        if overflow.is_empty() && inline.len() + e.len() + CE_LEN <= available {
            inline.extend_from_slice(&e);
        } else {
            overflow.extend_from_slice(&e);
        }
    }
    for e in spill {
        overflow.extend_from_slice(&e);
    }

    let offset = area.push(&overflow);
    inline.extend_from_slice(&ce(
        area_lba + (offset / BLOCK_SIZE) as u32,
        (offset % BLOCK_SIZE) as u32,
        overflow.len() as u32,
    ));
    inline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::S_IFREG;
    use std::path::PathBuf;

    fn meta() -> PosixMeta {
        PosixMeta {
            mode: S_IFREG | 0o644,
            uid: 1000,
            gid: 100,
            mtime: 0,
        }
    }

    #[test]
    fn test_entry_lengths() {
        assert_eq!(sp().len(), 7);
        assert_eq!(rr(present::PX).len(), 5);
        assert_eq!(px(&meta(), 1).len(), 36);
        assert_eq!(tf(0).len(), 19);
        assert_eq!(ce(0, 0, 0).len(), CE_LEN);
        let er = er();
        assert_eq!(er[2] as usize, er.len());
        assert_eq!(&er[..2], b"ER");
    }

    #[test]
    fn test_px_fields() {
        let entry = px(&meta(), 3);
        assert_eq!(&entry[..4], &[b'P', b'X', 36, 1]);
        assert_eq!(&entry[4..8], &(S_IFREG | 0o644).to_le_bytes());
        assert_eq!(&entry[12..16], &3u32.to_le_bytes());
        assert_eq!(&entry[20..24], &1000u32.to_le_bytes());
        assert_eq!(&entry[28..32], &100u32.to_le_bytes());
    }

    #[test]
    fn test_nm_short_name() {
        let entries = nm("notes.md");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0][2], 13);
        assert_eq!(entries[0][4], 0);
        assert_eq!(&entries[0][5..], b"notes.md");
    }

    #[test]
    fn test_nm_long_name_continues() {
        let name = "n".repeat(300);
        let entries = nm(&name);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].len(), 255);
        assert_eq!(entries[0][4], CONTINUE);
        assert_eq!(entries[1][4], 0);
        let joined: Vec<u8> = entries.iter().flat_map(|e| e[5..].to_vec()).collect();
        assert_eq!(joined, name.as_bytes());
    }

    #[test]
    fn test_sl_components() {
        let entries = sl(Path::new("/usr/../lib"));
        assert_eq!(entries.len(), 1);
        let data = &entries[0][5..];
        assert_eq!(
            data,
            &[
                SL_ROOT, 0, 0, 3, b'u', b's', b'r', SL_PARENT, 0, 0, 3, b'l', b'i', b'b'
            ]
        );
    }

    #[test]
    fn test_sl_relative_target() {
        let entries = sl(Path::new("real.txt"));
        assert_eq!(&entries[0][5..], &[0, 8, b'r', b'e', b'a', b'l', b'.', b't', b'x', b't']);
    }

    #[test]
    fn test_sl_long_target_splits_entries() {
        let target: PathBuf = (0..40).map(|i| format!("segment{:02}", i)).collect();
        let entries = sl(&target);
        assert!(entries.len() > 1);
        for (i, e) in entries.iter().enumerate() {
            assert!(e.len() <= 255);
            assert_eq!(e[2] as usize, e.len());
            let expected = if i + 1 < entries.len() { CONTINUE } else { 0 };
            assert_eq!(e[4], expected);
        }
    }

    #[test]
    fn test_pack_fits_inline() {
        let mut area = ContinuationArea::default();
        let packed = pack_system_use(vec![rr(0), tf(0)], Vec::new(), 200, &mut area, 50);
        assert_eq!(packed.len(), 24);
        assert_eq!(area.len(), 0);
    }

    #[test]
    fn test_pack_overflow_uses_continuation() {
        let mut area = ContinuationArea::default();
        let entries = vec![rr(0), px(&meta(), 1), tf(0)];
        let packed = pack_system_use(entries, Vec::new(), 60, &mut area, 50);
        // RR and CE inline, PX and TF moved out
        assert_eq!(packed.len(), 5 + CE_LEN);
        assert_eq!(&packed[5..7], b"CE");
        assert_eq!(area.len(), 36 + 19);
        assert_eq!(&packed[9..13], &50u32.to_le_bytes());
        assert_eq!(&packed[17..21], &0u32.to_le_bytes());
        assert_eq!(&packed[25..29], &55u32.to_le_bytes());
    }

    #[test]
    fn test_pack_forced_spill() {
        let mut area = ContinuationArea::default();
        let packed = pack_system_use(vec![sp(), rr(0)], vec![er()], 200, &mut area, 9);
        assert_eq!(&packed[..2], b"SP");
        assert_eq!(&packed[12..14], b"CE");
        assert_eq!(area.into_bytes(), er());
    }

    #[test]
    fn test_continuation_chunks_do_not_cross_blocks() {
        let mut area = ContinuationArea::default();
        assert_eq!(area.push(&[1; 2000]), 0);
        assert_eq!(area.push(&[2; 100]), 2048);
        assert_eq!(area.push(&[3; 48]), 2148);
        assert_eq!(area.len(), 2196);
    }
}
