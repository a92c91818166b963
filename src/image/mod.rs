//! Image Writer - lays out and serializes an ISO-9660 volume
//!
//! This module contains:
//! - Field encodings and volume descriptors
//! - Directory records, path tables and block allocation
//! - Joliet and Rock Ridge extensions
//! - Content copy with per-file error handling and atomic finalization

mod descriptor;
mod directory;
mod encoding;
mod layout;
mod options;
mod rock_ridge;
mod writer;

pub use options::{DEFAULT_APPLICATION, DEFAULT_SYSTEM_ID, WriteOptions};
pub use writer::write_image;

/// Logical block size of the image
pub const BLOCK_SIZE: usize = 2048;
