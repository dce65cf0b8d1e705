//! Parsing helpers for the remote service's timestamp formats, plus small
//! logging utilities.
//!
//! The remote front end hands back three different time shapes:
//! - article headers: `"Sat Oct  4 21:16:48 2025"` (ctime-style, padded day)
//! - task config clock bounds: `"HH:MM"`
//! - task config calendar bounds: `"YYYY-MM-DD"`

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Parse a ctime-style article timestamp, e.g. `"Sat Oct  4 21:16:48 2025"`.
///
/// The remote pads single-digit days with an extra space, so the string is
/// whitespace-normalized before parsing. Returns `None` for anything that
/// does not match; callers treat unparseable timestamps as "outside every
/// window", the same way the listing itself skips corrupt entries.
pub fn parse_remote_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, "%a %b %e %H:%M:%S %Y").ok()
}

/// Parse an `HH:MM` clock bound from a task description.
pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}

/// Parse a `YYYY-MM-DD` calendar bound from a task description.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` bytes with an ellipsis and byte count
/// appended. The cut point backs up to the nearest char boundary so the
/// slice stays valid for multibyte content.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
    }
}
