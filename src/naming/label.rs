//! Volume label normalization
//!
//! The Primary Volume Descriptor holds 32 d-characters, the Joliet
//! descriptor 16 UCS-2 characters. Both are derived from one user label.

use super::sanitizer::{iso_chars, joliet_chars, truncate_utf16};

/// Label used when the user leaves the field empty
pub const DEFAULT_LABEL: &str = "MYCDROM";
/// Volume identifier field width in the Primary Volume Descriptor
pub const VOLUME_ID_LEN: usize = 32;
/// Volume identifier width in the Joliet descriptor (UCS-2 units)
pub const JOLIET_VOLUME_ID_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeLabel {
    pub primary: String,
    pub joliet: String,
}

/// Trimmed label, or [`DEFAULT_LABEL`] if nothing is left
pub fn label_or_default(label: &str) -> &str {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        DEFAULT_LABEL
    } else {
        trimmed
    }
}

pub fn normalize_label(label: &str) -> VolumeLabel {
    let label = label_or_default(label);
    VolumeLabel {
        primary: iso_chars(label).chars().take(VOLUME_ID_LEN).collect(),
        joliet: truncate_utf16(&joliet_chars(label), JOLIET_VOLUME_ID_LEN),
    }
}
