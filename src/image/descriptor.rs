//! Volume descriptors
//!
//! The primary and Joliet supplementary descriptors share one layout and
//! differ only in type, escape sequence, text encoding and the tree they
//! point at.

use super::BLOCK_SIZE;
use super::directory::{FLAG_DIRECTORY, RecordSpec, SELF_IDENTIFIER, encode_record};
use super::encoding::{a_chars, both_u16, both_u32, padded_ucs2, record_datetime, volume_datetime};
use super::layout::{ImageLayout, NamespaceTree};
use super::options::WriteOptions;
use crate::naming::VolumeLabel;
use crate::plan::BuildManifest;

pub(crate) const STANDARD_ID: &[u8; 5] = b"CD001";

const TYPE_PRIMARY: u8 = 1;
const TYPE_SUPPLEMENTARY: u8 = 2;
const TYPE_TERMINATOR: u8 = 255;

/// UCS-2 level 3
pub(crate) const JOLIET_ESCAPE: &[u8; 3] = b"%/E";

mod offset {
    pub const SYSTEM_ID: usize = 8;
    pub const VOLUME_ID: usize = 40;
    pub const VOLUME_SPACE_SIZE: usize = 80;
    pub const ESCAPE_SEQUENCES: usize = 88;
    pub const VOLUME_SET_SIZE: usize = 120;
    pub const VOLUME_SEQUENCE_NUMBER: usize = 124;
    pub const BLOCK_SIZE: usize = 128;
    pub const PATH_TABLE_SIZE: usize = 132;
    pub const PATH_TABLE_L: usize = 140;
    pub const PATH_TABLE_M: usize = 148;
    pub const ROOT_RECORD: usize = 156;
    pub const VOLUME_SET_ID: usize = 190;
    pub const PUBLISHER_ID: usize = 318;
    pub const PREPARER_ID: usize = 446;
    pub const APPLICATION_ID: usize = 574;
    pub const COPYRIGHT_FILE: usize = 702;
    pub const CREATION_DATE: usize = 813;
    pub const MODIFICATION_DATE: usize = 830;
    pub const EXPIRATION_DATE: usize = 847;
    pub const EFFECTIVE_DATE: usize = 864;
    pub const FILE_STRUCTURE_VERSION: usize = 881;
}

/// Copyright, abstract and bibliographic file identifiers
const FILE_ID_FIELDS: usize = 3;
const FILE_ID_LEN: usize = 37;

fn header(kind: u8) -> Vec<u8> {
    let mut block = vec![0u8; BLOCK_SIZE];
    block[0] = kind;
    block[1..6].copy_from_slice(STANDARD_ID);
    block[6] = 1;
    block
}

fn put(block: &mut [u8], at: usize, bytes: &[u8]) {
    block[at..at + bytes.len()].copy_from_slice(bytes);
}

/// Text encoding of a descriptor's identifier fields
#[derive(Clone, Copy)]
enum Text {
    Ascii,
    Ucs2,
}

impl Text {
    fn field(self, s: &str, len: usize) -> Vec<u8> {
        match self {
            Text::Ascii => a_chars(s, len),
            Text::Ucs2 => padded_ucs2(s, len),
        }
    }
}

fn volume_descriptor(
    kind: u8,
    text: Text,
    volume_id: &str,
    tree: &NamespaceTree,
    manifest: &BuildManifest,
    layout: &ImageLayout,
    options: &WriteOptions,
) -> Vec<u8> {
    let mut block = header(kind);

    put(&mut block, offset::SYSTEM_ID, &text.field(&options.system_id, 32));
    put(&mut block, offset::VOLUME_ID, &text.field(volume_id, 32));
    put(
        &mut block,
        offset::VOLUME_SPACE_SIZE,
        &both_u32(layout.total_blocks),
    );
    if kind == TYPE_SUPPLEMENTARY {
        put(&mut block, offset::ESCAPE_SEQUENCES, JOLIET_ESCAPE);
    }
    put(&mut block, offset::VOLUME_SET_SIZE, &both_u16(1));
    put(&mut block, offset::VOLUME_SEQUENCE_NUMBER, &both_u16(1));
    put(&mut block, offset::BLOCK_SIZE, &both_u16(BLOCK_SIZE as u16));
    put(
        &mut block,
        offset::PATH_TABLE_SIZE,
        &both_u32(tree.path_table_size),
    );
    put(
        &mut block,
        offset::PATH_TABLE_L,
        &tree.path_table_l.to_le_bytes(),
    );
    put(
        &mut block,
        offset::PATH_TABLE_M,
        &tree.path_table_m.to_be_bytes(),
    );

    let root = tree.root();
    let root_record = encode_record(&RecordSpec {
        identifier: SELF_IDENTIFIER,
        lba: root.lba,
        size: root.size,
        flags: FLAG_DIRECTORY,
        date: record_datetime(manifest.root().meta.mtime),
        system_use: &[],
    });
    put(&mut block, offset::ROOT_RECORD, &root_record);

    put(&mut block, offset::VOLUME_SET_ID, &text.field("", 128));
    put(&mut block, offset::PUBLISHER_ID, &text.field(&options.publisher, 128));
    put(&mut block, offset::PREPARER_ID, &text.field(&options.preparer, 128));
    put(
        &mut block,
        offset::APPLICATION_ID,
        &text.field(&options.application, 128),
    );
    for i in 0..FILE_ID_FIELDS {
        put(
            &mut block,
            offset::COPYRIGHT_FILE + i * FILE_ID_LEN,
            &text.field("", FILE_ID_LEN),
        );
    }

    let recorded = volume_datetime(options.recorded_at);
    let unspecified = volume_datetime(None);
    put(&mut block, offset::CREATION_DATE, &recorded);
    put(&mut block, offset::MODIFICATION_DATE, &recorded);
    put(&mut block, offset::EXPIRATION_DATE, &unspecified);
    put(&mut block, offset::EFFECTIVE_DATE, &unspecified);
    block[offset::FILE_STRUCTURE_VERSION] = 1;
    block
}

pub(crate) fn primary_descriptor(
    manifest: &BuildManifest,
    layout: &ImageLayout,
    label: &VolumeLabel,
    options: &WriteOptions,
) -> Vec<u8> {
    volume_descriptor(
        TYPE_PRIMARY,
        Text::Ascii,
        &label.primary,
        &layout.primary,
        manifest,
        layout,
        options,
    )
}

/// Joliet supplementary descriptor, when the layout has a Joliet tree
pub(crate) fn joliet_descriptor(
    manifest: &BuildManifest,
    layout: &ImageLayout,
    label: &VolumeLabel,
    options: &WriteOptions,
) -> Option<Vec<u8>> {
    let tree = layout.joliet.as_ref()?;
    Some(volume_descriptor(
        TYPE_SUPPLEMENTARY,
        Text::Ucs2,
        &label.joliet,
        tree,
        manifest,
        layout,
        options,
    ))
}

pub(crate) fn terminator() -> Vec<u8> {
    header(TYPE_TERMINATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::normalize_label;
    use crate::plan::{PlanOptions, build_plan};
    use crate::test_fixtures::write_tree;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn fixture(joliet: bool) -> (TempDir, BuildManifest, ImageLayout) {
        let temp = TempDir::new().unwrap();
        write_tree(temp.path(), &[("a.txt", "hello")]);
        let manifest = build_plan(temp.path(), false, &PlanOptions::default()).unwrap();
        let layout = ImageLayout::plan(&manifest, joliet, true).unwrap();
        (temp, manifest, layout)
    }

    #[test]
    fn test_primary_descriptor_fields() {
        let (_temp, manifest, layout) = fixture(true);
        let options = WriteOptions::default();
        let pvd = primary_descriptor(&manifest, &layout, &normalize_label("Backup"), &options);

        assert_eq!(pvd.len(), 2048);
        assert_eq!(pvd[0], 1);
        assert_eq!(&pvd[1..6], b"CD001");
        assert_eq!(&pvd[8..13], b"LINUX");
        assert_eq!(&pvd[40..46], b"BACKUP");
        assert_eq!(pvd[46], b' ');
        assert_eq!(&pvd[80..84], &layout.total_blocks.to_le_bytes());
        assert_eq!(&pvd[84..88], &layout.total_blocks.to_be_bytes());
        assert_eq!(&pvd[88..91], &[0, 0, 0]);
        assert_eq!(&pvd[128..130], &2048u16.to_le_bytes());
        assert_eq!(&pvd[132..136], &layout.primary.path_table_size.to_le_bytes());
        assert_eq!(&pvd[140..144], &layout.primary.path_table_l.to_le_bytes());
        assert_eq!(&pvd[148..152], &layout.primary.path_table_m.to_be_bytes());
        assert_eq!(pvd[156], 34);
        assert_eq!(&pvd[158..162], &layout.primary.root().lba.to_le_bytes());
        assert_eq!(&pvd[574..585], b"ISO-CREATOR");
        assert_eq!(&pvd[813..829], b"0000000000000000");
        assert_eq!(pvd[881], 1);
    }

    #[test]
    fn test_joliet_descriptor_fields() {
        let (_temp, manifest, layout) = fixture(true);
        let svd = joliet_descriptor(
            &manifest,
            &layout,
            &normalize_label("Backup"),
            &WriteOptions::default(),
        )
        .unwrap();
        assert_eq!(svd[0], 2);
        assert_eq!(&svd[88..91], b"%/E");
        assert_eq!(&svd[40..52], &[0, b'B', 0, b'a', 0, b'c', 0, b'k', 0, b'u', 0, b'p']);
        assert_eq!(&svd[52..54], &[0, b' ']);
        let joliet = layout.joliet.as_ref().unwrap();
        assert_eq!(&svd[158..162], &joliet.root().lba.to_le_bytes());
        assert_eq!(&svd[140..144], &joliet.path_table_l.to_le_bytes());
    }

    #[test]
    fn test_no_joliet_descriptor_without_tree() {
        let (_temp, manifest, layout) = fixture(false);
        let label = normalize_label("x");
        assert!(joliet_descriptor(&manifest, &layout, &label, &WriteOptions::default()).is_none());
    }

    #[test]
    fn test_recorded_at_sets_creation_and_modification() {
        let (_temp, manifest, layout) = fixture(false);
        let options = WriteOptions {
            recorded_at: Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()),
            ..WriteOptions::default()
        };
        let pvd = primary_descriptor(&manifest, &layout, &normalize_label("x"), &options);
        assert_eq!(&pvd[813..829], b"2024060112000000");
        assert_eq!(&pvd[830..846], b"2024060112000000");
        assert_eq!(&pvd[847..863], b"0000000000000000");
    }

    #[test]
    fn test_terminator() {
        let block = terminator();
        assert_eq!(block[0], 255);
        assert_eq!(&block[1..7], b"CD001\x01");
        assert!(block[7..].iter().all(|&b| b == 0));
    }
}
