//! Test fixtures for image building tests
//!
//! Source trees are written into temp directories. Finished images are
//! mounted with the `iso9660` crate for the primary namespace. Joliet,
//! Rock Ridge and the path tables are not exposed by that crate, so a
//! small hand-written parser covers those.

#![cfg(test)]

use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};
use iso9660::directory::iterator::DirectoryIterator;
use iso9660::{FileEntry, VolumeInfo};
use std::io;
use std::path::{Path, PathBuf};

const SECTOR: usize = 2048;
const FIRST_DESCRIPTOR: usize = 16;

/// Create `files` under `root`, with parent directories as needed
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    std::fs::create_dir_all(root).expect("Failed to create source root");
    for (relative, contents) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, contents).expect("Failed to write fixture file");
    }
}

/// Staging files left behind in `dir`
pub fn leftover_parts(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "part"))
        .collect()
}

/// Read-only block device over an image held in memory
struct ImageDevice<'a> {
    data: &'a [u8],
}

impl BlockIo for ImageDevice<'_> {
    type Error = io::Error;

    fn block_size(&self) -> BlockSize {
        BlockSize::new(SECTOR as u32).expect("valid block size")
    }

    fn num_blocks(&mut self) -> Result<u64, Self::Error> {
        Ok((self.data.len() / SECTOR) as u64)
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> Result<(), Self::Error> {
        let offset = start_lba.0 as usize * SECTOR;
        if offset + dst.len() > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read beyond end of image",
            ));
        }
        dst.copy_from_slice(&self.data[offset..offset + dst.len()]);
        Ok(())
    }

    fn write_blocks(&mut self, _start_lba: Lba, _src: &[u8]) -> Result<(), Self::Error> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "image is read-only",
        ))
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTableRecord {
    pub name: String,
    pub parent: u16,
    pub lba: u32,
}

#[derive(Debug, Clone)]
struct Record {
    lba: u32,
    size: u32,
    flags: u8,
    identifier: Vec<u8>,
    system_use: Vec<u8>,
}

impl Record {
    fn is_dir(&self) -> bool {
        self.flags & 0x02 != 0
    }

    fn is_special(&self) -> bool {
        self.identifier == [0] || self.identifier == [1]
    }
}

fn le_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn be_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn decode_ucs2(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes.chunks_exact(2).map(be_u16).collect();
    String::from_utf16_lossy(&units)
}

/// Primary identifier as the `iso9660` crate names it: no `;1`, no
/// trailing dot
fn primary_name(identifier: &[u8]) -> String {
    let full = String::from_utf8_lossy(identifier);
    let base = full.split(';').next().unwrap_or_default();
    base.strip_suffix('.').unwrap_or(base).to_string()
}

fn parse_record(bytes: &[u8]) -> Record {
    let id_len = bytes[32] as usize;
    let identifier = bytes[33..33 + id_len].to_vec();
    let pad = usize::from(id_len % 2 == 0);
    let su_start = 33 + id_len + pad;
    let system_use = if su_start < bytes.len() {
        bytes[su_start..].to_vec()
    } else {
        Vec::new()
    };
    Record {
        lba: le_u32(&bytes[2..6]),
        size: le_u32(&bytes[10..14]),
        flags: bytes[25],
        identifier,
        system_use,
    }
}

/// View of a finished image
pub struct IsoReader {
    bytes: Vec<u8>,
}

impl IsoReader {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn open(path: &Path) -> Self {
        Self::new(std::fs::read(path).expect("Failed to read image"))
    }

    fn device(&self) -> ImageDevice<'_> {
        ImageDevice { data: &self.bytes }
    }

    fn mount(&self) -> VolumeInfo {
        iso9660::mount(&mut self.device(), 0).expect("Image does not mount")
    }

    fn find(&self, path: &str) -> Option<FileEntry> {
        let volume = self.mount();
        iso9660::find_file(&mut self.device(), &volume, path).ok()
    }

    pub fn volume_id(&self) -> String {
        String::from_utf8_lossy(&self.mount().volume_id)
            .trim_end()
            .to_string()
    }

    pub fn has_joliet(&self) -> bool {
        self.mount().has_joliet
    }

    /// Names in the primary namespace, in record order
    pub fn list_dir(&self, path: &str) -> Vec<String> {
        let Some(dir) = self.find(path).filter(|e| e.flags.directory) else {
            return Vec::new();
        };
        let mut device = self.device();
        let mut names: Vec<String> =
            DirectoryIterator::new(&mut device, dir.extent_lba, dir.data_length)
                .map(|entry| entry.expect("Corrupt directory record").name)
                .collect();
        // Multi-extent files repeat their identifier
        names.dedup();
        names
    }

    pub fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        let file = self.find(path).filter(|e| !e.flags.directory)?;
        iso9660::file::read_file_vec(&mut self.device(), &file).ok()
    }

    pub fn dir_lba(&self, path: &str) -> Option<u32> {
        self.find(path)
            .filter(|e| e.flags.directory)
            .map(|e| e.extent_lba)
    }

    pub fn dir_size(&self, path: &str) -> Option<u32> {
        self.find(path)
            .filter(|e| e.flags.directory)
            .map(|e| e.data_length)
    }

    fn sector(&self, lba: usize) -> &[u8] {
        &self.bytes[lba * SECTOR..(lba + 1) * SECTOR]
    }

    fn descriptor(&self, kind: u8) -> Option<&[u8]> {
        let mut lba = FIRST_DESCRIPTOR;
        while (lba + 1) * SECTOR <= self.bytes.len() {
            let sector = self.sector(lba);
            if &sector[1..6] != b"CD001" || sector[0] == 255 {
                return None;
            }
            if sector[0] == kind {
                return Some(sector);
            }
            lba += 1;
        }
        None
    }

    fn primary(&self) -> &[u8] {
        self.descriptor(1).expect("No primary volume descriptor")
    }

    fn joliet(&self) -> Option<&[u8]> {
        self.descriptor(2).filter(|svd| &svd[88..91] == b"%/E")
    }

    /// Records of the directory at `lba`, `.` and `..` included
    fn records(&self, lba: u32, size: u32) -> Vec<Record> {
        let mut records = Vec::new();
        let blocks = (size as usize).div_ceil(SECTOR);
        for block in 0..blocks {
            let sector = self.sector(lba as usize + block);
            let mut pos = 0;
            while pos < SECTOR {
                let len = sector[pos] as usize;
                if len == 0 {
                    break;
                }
                records.push(parse_record(&sector[pos..pos + len]));
                pos += len;
            }
        }
        records
    }

    fn root(descriptor: &[u8]) -> Record {
        parse_record(&descriptor[156..190])
    }

    fn name(record: &Record, joliet: bool) -> String {
        if joliet {
            decode_ucs2(&record.identifier)
        } else {
            primary_name(&record.identifier)
        }
    }

    fn resolve(&self, root: Record, path: &str, joliet: bool) -> Option<Vec<Record>> {
        let mut current = vec![root];
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let dir = current.last()?;
            if !dir.is_dir() {
                return None;
            }
            let matches: Vec<Record> = self
                .records(dir.lba, dir.size)
                .into_iter()
                .filter(|r| !r.is_special())
                .filter(|r| Self::name(r, joliet) == component)
                .collect();
            if matches.is_empty() {
                return None;
            }
            current = matches;
        }
        Some(current)
    }

    /// Joliet identifiers, `;1` included, in record order
    pub fn joliet_list_dir(&self, path: &str) -> Vec<String> {
        let Some(svd) = self.joliet() else {
            return Vec::new();
        };
        let Some(found) = self.resolve(Self::root(svd), path, true) else {
            return Vec::new();
        };
        let dir = &found[0];
        let mut names: Vec<String> = self
            .records(dir.lba, dir.size)
            .iter()
            .filter(|r| !r.is_special())
            .map(|r| Self::name(r, true))
            .collect();
        names.dedup();
        names
    }

    pub fn joliet_read_file(&self, path: &str) -> Option<Vec<u8>> {
        let extents = self.resolve(Self::root(self.joliet()?), path, true)?;
        let mut data = Vec::new();
        for extent in extents.iter().filter(|r| !r.is_dir()) {
            let start = extent.lba as usize * SECTOR;
            data.extend_from_slice(&self.bytes[start..start + extent.size as usize]);
        }
        Some(data)
    }

    /// System Use entries of `record`, following continuation areas
    fn susp_entries(&self, record: &Record) -> Vec<([u8; 2], Vec<u8>)> {
        let mut entries = Vec::new();
        let mut area = record.system_use.clone();
        loop {
            let mut next = None;
            let mut pos = 0;
            while pos + 4 <= area.len() {
                let len = area[pos + 2] as usize;
                if len < 4 || pos + len > area.len() {
                    break;
                }
                let signature = [area[pos], area[pos + 1]];
                let body = area[pos..pos + len].to_vec();
                if &signature == b"CE" {
                    next = Some((
                        le_u32(&body[4..8]) as usize,
                        le_u32(&body[12..16]) as usize,
                        le_u32(&body[20..24]) as usize,
                    ));
                } else if &signature == b"ST" {
                    break;
                }
                entries.push((signature, body));
                pos += len;
            }
            let Some((block, offset, len)) = next else {
                break;
            };
            let start = block * SECTOR + offset;
            area = self.bytes[start..start + len].to_vec();
        }
        entries
    }

    /// Rock Ridge names of the children of `path`
    pub fn rock_ridge_names(&self, path: &str) -> Vec<String> {
        let Some(found) = self.resolve(Self::root(self.primary()), path, false) else {
            return Vec::new();
        };
        let dir = &found[0];
        let mut names = Vec::new();
        for record in self.records(dir.lba, dir.size).iter().filter(|r| !r.is_special()) {
            let mut name = Vec::new();
            let mut seen = false;
            for (signature, body) in self.susp_entries(record) {
                if &signature == b"NM" {
                    seen = true;
                    name.extend_from_slice(&body[5..]);
                }
            }
            if seen {
                names.push(String::from_utf8_lossy(&name).to_string());
            }
        }
        names.dedup();
        names
    }

    /// Target of the symbolic link at `path`, joined from its SL components
    pub fn symlink_target(&self, path: &str) -> Option<String> {
        let found = self.resolve(Self::root(self.primary()), path, false)?;
        let mut target = String::new();
        let mut seen = false;
        let mut joined = true;
        for (signature, body) in self.susp_entries(&found[0]) {
            if &signature != b"SL" {
                continue;
            }
            seen = true;
            let mut pos = 5;
            while pos + 2 <= body.len() {
                let flags = body[pos];
                let len = body[pos + 1] as usize;
                let content = &body[pos + 2..pos + 2 + len];
                if !joined && !target.ends_with('/') {
                    target.push('/');
                }
                match flags & 0x0e {
                    0x08 => target.push('/'),
                    0x02 => target.push('.'),
                    0x04 => target.push_str(".."),
                    _ => target.push_str(&String::from_utf8_lossy(content)),
                }
                joined = flags & 0x01 != 0;
                pos += 2 + len;
            }
        }
        seen.then_some(target)
    }

    /// Path table records from the L (little-endian) or M table
    pub fn path_table(&self, big_endian: bool) -> Vec<PathTableRecord> {
        let pvd = self.primary();
        let size = le_u32(&pvd[132..136]) as usize;
        let lba = if big_endian {
            be_u32(&pvd[148..152])
        } else {
            le_u32(&pvd[140..144])
        } as usize;

        let table = &self.bytes[lba * SECTOR..lba * SECTOR + size];
        let mut records = Vec::new();
        let mut pos = 0;
        while pos < table.len() {
            let len = table[pos] as usize;
            if len == 0 {
                break;
            }
            let (extent, parent) = if big_endian {
                (be_u32(&table[pos + 2..]), be_u16(&table[pos + 6..]))
            } else {
                (le_u32(&table[pos + 2..]), le_u16(&table[pos + 6..]))
            };
            let identifier = &table[pos + 8..pos + 8 + len];
            let name = if identifier == [0] {
                String::new()
            } else {
                String::from_utf8_lossy(identifier).to_string()
            };
            records.push(PathTableRecord {
                name,
                parent,
                lba: extent,
            });
            pos += 8 + len + len % 2;
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_tree_creates_parents() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        write_tree(&root, &[("a/b/c.txt", "deep"), ("top.txt", "")]);
        assert_eq!(std::fs::read_to_string(root.join("a/b/c.txt")).unwrap(), "deep");
        assert!(root.join("top.txt").is_file());
    }

    #[test]
    fn test_leftover_parts() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(".x.iso.1234.part"), "").unwrap();
        std::fs::write(temp.path().join("x.iso"), "").unwrap();
        assert_eq!(leftover_parts(temp.path()).len(), 1);
        assert!(leftover_parts(&temp.path().join("missing")).is_empty());
    }

    #[test]
    fn test_primary_name_drops_version() {
        assert_eq!(primary_name(b"REPORT.TXT;1"), "REPORT.TXT");
        assert_eq!(primary_name(b"LINK.;1"), "LINK");
        assert_eq!(primary_name(b"MY_DOCS"), "MY_DOCS");
    }
}
