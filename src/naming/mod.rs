//! Naming - identifier rules for the ISO-9660 and Joliet namespaces
//!
//! This module contains:
//! - Per-segment sanitizing with collision handling
//! - Interchange level length rules
//! - Volume label normalization

mod label;
mod sanitizer;

pub use label::{
    DEFAULT_LABEL, JOLIET_VOLUME_ID_LEN, VOLUME_ID_LEN, VolumeLabel, label_or_default,
    normalize_label,
};
pub use sanitizer::{
    DEFAULT_JOLIET_MAX_LEN, InterchangeLevel, JOLIET_MAX_LEN_LIMIT, NameCollision, NameKind,
    PLACEHOLDER, Sanitizer, SiblingNames, TargetName,
};
