//! Path segment sanitizing
//!
//! Every path segment gets two identifiers: a d-character name for the
//! primary ISO-9660 tree and a UCS-2 name for the Joliet tree. Collisions
//! are resolved per directory and per namespace by appending `_1`, `_2`, ...
//! to the stem in first-seen order.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Substitute for names that sanitize to nothing
pub const PLACEHOLDER: &str = "_";
/// Characters not allowed in Joliet identifiers
const JOLIET_EXCLUDED: &[char] = &['*', '/', ':', ';', '?', '\\'];
/// Default Joliet identifier length in UCS-2 code units
pub const DEFAULT_JOLIET_MAX_LEN: usize = 64;
/// Longest Joliet identifier that still fits in a directory record
pub const JOLIET_MAX_LEN_LIMIT: usize = 103;
const MAX_SUFFIX: u32 = 99_999;

/// ECMA-119 interchange level
///
/// Level 1 enforces 8.3 names, levels 2 and 3 allow 30 character file
/// identifiers. Level 3 additionally allows files split across several
/// extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum InterchangeLevel {
    #[default]
    One,
    Two,
    Three,
}

impl InterchangeLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            InterchangeLevel::One => 1,
            InterchangeLevel::Two => 2,
            InterchangeLevel::Three => 3,
        }
    }

    pub fn allows_multi_extent(self) -> bool {
        self == InterchangeLevel::Three
    }

    fn limits(self) -> NameLimits {
        match self {
            InterchangeLevel::One => NameLimits {
                stem: 8,
                ext: 3,
                total: 11,
                dir: 8,
            },
            InterchangeLevel::Two | InterchangeLevel::Three => NameLimits {
                stem: 30,
                ext: 27,
                total: 30,
                dir: 31,
            },
        }
    }
}

impl TryFrom<u8> for InterchangeLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(InterchangeLevel::One),
            2 => Ok(InterchangeLevel::Two),
            3 => Ok(InterchangeLevel::Three),
            other => Err(format!("unsupported interchange level {}", other)),
        }
    }
}

impl From<InterchangeLevel> for u8 {
    fn from(level: InterchangeLevel) -> Self {
        level.as_u8()
    }
}

struct NameLimits {
    stem: usize,
    ext: usize,
    /// stem + extension, separator not counted
    total: usize,
    dir: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    File,
    Directory,
}

/// Identifiers for one path segment in each namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetName {
    /// `NAME.EXT` or `NAME`, without the `;1` version suffix
    pub iso9660: String,
    pub joliet: String,
}

/// Names already taken in one directory
#[derive(Debug, Default, Clone)]
pub struct SiblingNames {
    iso9660: HashSet<String>,
    joliet: HashSet<String>,
}

impl SiblingNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_iso9660(&self, name: &str) -> bool {
        self.iso9660.contains(name)
    }

    pub fn contains_joliet(&self, name: &str) -> bool {
        self.joliet.contains(name)
    }

    pub fn len(&self) -> usize {
        self.iso9660.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iso9660.is_empty()
    }
}

/// Returned when every numeric suffix for a name is already taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCollision {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sanitizer {
    level: InterchangeLevel,
    joliet_max_len: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(InterchangeLevel::One, DEFAULT_JOLIET_MAX_LEN)
    }
}

impl Sanitizer {
    /// `joliet_max_len` is clamped to `1..=JOLIET_MAX_LEN_LIMIT`
    pub fn new(level: InterchangeLevel, joliet_max_len: usize) -> Self {
        Self {
            level,
            joliet_max_len: joliet_max_len.clamp(1, JOLIET_MAX_LEN_LIMIT),
        }
    }

    pub fn level(&self) -> InterchangeLevel {
        self.level
    }

    pub fn joliet_max_len(&self) -> usize {
        self.joliet_max_len
    }

    /// Map `segment` to identifiers that are unique among `siblings`, and
    /// register them there.
    pub fn sanitize(
        &self,
        segment: &str,
        kind: NameKind,
        siblings: &mut SiblingNames,
    ) -> Result<TargetName, NameCollision> {
        let iso9660 = self.unique_iso9660(segment, kind, &mut siblings.iso9660)?;
        let joliet = self.unique_joliet(segment, kind, &mut siblings.joliet)?;
        Ok(TargetName { iso9660, joliet })
    }

    fn unique_iso9660(
        &self,
        segment: &str,
        kind: NameKind,
        taken: &mut HashSet<String>,
    ) -> Result<String, NameCollision> {
        let limits = self.level.limits();
        let (stem, ext, stem_max) = match kind {
            NameKind::Directory => {
                let stem = or_placeholder(truncate_chars(&iso_chars(segment), limits.dir));
                (stem, None, limits.dir)
            }
            NameKind::File => {
                let (stem, ext) = split_extension(segment);
                let ext = ext
                    .map(|e| truncate_chars(&iso_chars(e), limits.ext))
                    .filter(|e| !e.is_empty());
                let ext_len = ext.as_ref().map_or(0, |e| e.len());
                let stem_max = limits.stem.min(limits.total - ext_len);
                let stem = or_placeholder(truncate_chars(&iso_chars(stem), stem_max));
                (stem, ext, stem_max)
            }
        };

        let base = join_extension(&stem, ext.as_deref());
        if taken.insert(base.clone()) {
            return Ok(base);
        }

        for n in 1..=MAX_SUFFIX {
            let suffix = format!("_{}", n);
            let room = stem_max.saturating_sub(suffix.len());
            let candidate = join_extension(
                &format!("{}{}", truncate_chars(&stem, room), suffix),
                ext.as_deref(),
            );
            if taken.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }

        Err(NameCollision { name: base })
    }

    fn unique_joliet(
        &self,
        segment: &str,
        kind: NameKind,
        taken: &mut HashSet<String>,
    ) -> Result<String, NameCollision> {
        let max = self.joliet_max_len;
        let base = or_placeholder(truncate_utf16(&joliet_chars(segment), max));
        if taken.insert(base.clone()) {
            return Ok(base);
        }

        // Keep the extension visible when the suffix is added
        let (stem, ext) = match kind {
            NameKind::File => split_extension(&base),
            NameKind::Directory => (base.as_str(), None),
        };

        for n in 1..=MAX_SUFFIX {
            let mut tail = format!("_{}", n);
            if let Some(ext) = ext {
                let with_ext = format!("{}.{}", tail, ext);
                if utf16_len(&with_ext) < max {
                    tail = with_ext;
                }
            }
            let room = max.saturating_sub(utf16_len(&tail));
            let candidate = format!("{}{}", truncate_utf16(stem, room), tail);
            if taken.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }

        Err(NameCollision { name: base })
    }
}

/// Uppercase and replace everything outside `[A-Z0-9_]` with `_`
pub(crate) fn iso_chars(s: &str) -> String {
    s.chars()
        .map(|c| {
            let upper = c.to_ascii_uppercase();
            if upper.is_ascii_uppercase() || upper.is_ascii_digit() || upper == '_' {
                upper
            } else {
                '_'
            }
        })
        .collect()
}

/// Replace control characters and the Joliet exclusion set with `_`
pub(crate) fn joliet_chars(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_control() || JOLIET_EXCLUDED.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Truncate to at most `max_units` UTF-16 code units without splitting a
/// surrogate pair
pub(crate) fn truncate_utf16(s: &str, max_units: usize) -> String {
    let mut out = String::new();
    let mut units = 0;
    for c in s.chars() {
        let width = c.len_utf16();
        if units + width > max_units {
            break;
        }
        units += width;
        out.push(c);
    }
    out
}

fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn or_placeholder(s: String) -> String {
    if s.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        s
    }
}

/// Split at the last dot. A leading dot is part of the name and an empty
/// extension is dropped.
fn split_extension(segment: &str) -> (&str, Option<&str>) {
    match segment.rfind('.') {
        None | Some(0) => (segment, None),
        Some(i) => {
            let ext = &segment[i + 1..];
            let ext = if ext.is_empty() { None } else { Some(ext) };
            (&segment[..i], ext)
        }
    }
}

fn join_extension(stem: &str, ext: Option<&str>) -> String {
    match ext {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem.to_string(),
    }
}
