//! Field encodings shared by descriptors and directory records

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Punctuation allowed in a-character fields besides `[A-Z0-9_ ]`
const A_CHAR_PUNCTUATION: &str = "!\"%&'()*+,-./:;<=>?";

/// 16-bit value stored little-endian then big-endian
pub(crate) fn both_u16(value: u16) -> [u8; 4] {
    let mut out = [0u8; 4];
    out[0..2].copy_from_slice(&value.to_le_bytes());
    out[2..4].copy_from_slice(&value.to_be_bytes());
    out
}

/// 32-bit value stored little-endian then big-endian
pub(crate) fn both_u32(value: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[0..4].copy_from_slice(&value.to_le_bytes());
    out[4..8].copy_from_slice(&value.to_be_bytes());
    out
}

/// Map to a-characters, truncate and pad with spaces to `len` bytes
pub(crate) fn a_chars(s: &str, len: usize) -> Vec<u8> {
    let mut out: Vec<u8> = s
        .chars()
        .map(|c| {
            let upper = c.to_ascii_uppercase();
            if upper.is_ascii_uppercase()
                || upper.is_ascii_digit()
                || upper == '_'
                || upper == ' '
                || A_CHAR_PUNCTUATION.contains(upper)
            {
                upper as u8
            } else {
                b'_'
            }
        })
        .take(len)
        .collect();
    out.resize(len, b' ');
    out
}

/// UCS-2 big-endian
pub(crate) fn ucs2_be(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

/// UCS-2 big-endian, truncated and padded with UCS-2 spaces to `len` bytes
pub(crate) fn padded_ucs2(s: &str, len: usize) -> Vec<u8> {
    let mut out = ucs2_be(s);
    out.truncate(len - len % 2);
    while out.len() + 1 < len {
        out.extend_from_slice(&[0x00, 0x20]);
    }
    out.resize(len, 0);
    out
}

/// 7-byte recording date of a directory record, in UTC
///
/// Times outside 1900..=2155 cannot be represented and are written as
/// all zeros.
pub(crate) fn record_datetime(seconds: i64) -> [u8; 7] {
    let Some(at) = DateTime::<Utc>::from_timestamp(seconds, 0) else {
        return [0; 7];
    };
    let year = at.year() - 1900;
    if !(0..=255).contains(&year) {
        return [0; 7];
    }
    [
        year as u8,
        at.month() as u8,
        at.day() as u8,
        at.hour() as u8,
        at.minute() as u8,
        at.second() as u8,
        0,
    ]
}

/// 17-byte volume descriptor date; `None` encodes "not specified"
pub(crate) fn volume_datetime(at: Option<DateTime<Utc>>) -> [u8; 17] {
    let mut out = [b'0'; 17];
    out[16] = 0;
    if let Some(at) = at
        && (0..=9999).contains(&at.year())
    {
        let digits = format!(
            "{}{:02}",
            at.format("%Y%m%d%H%M%S"),
            at.timestamp_subsec_millis() / 10
        );
        out[..16].copy_from_slice(&digits.as_bytes()[..16]);
    }
    out
}
