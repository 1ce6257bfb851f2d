//! Conflict copy naming
//!
//! `KeepBoth` renames the local copy with a deterministic suffix derived
//! from the conflict detection time, so repeated resolution attempts of the
//! same conflict produce the same name:
//!
//! `report (conflicted copy 2026-08-28 14-03-59).txt`
//!
//! If that name is somehow taken, a numeric counter is appended before
//! giving up.

use chrono::{DateTime, Utc};

/// Highest numeric disambiguation counter tried before giving up.
const MAX_COUNTER: u32 = 99;

/// Splits `name` into (stem, extension-with-dot)
///
/// A leading dot (hidden files) is part of the stem, not an extension.
fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// The deterministic conflict-copy name for `name` at `detected_at`
pub fn conflict_name(name: &str, detected_at: DateTime<Utc>) -> String {
    let (stem, ext) = split_name(name);
    format!(
        "{} (conflicted copy {}){}",
        stem,
        detected_at.format("%Y-%m-%d %H-%M-%S"),
        ext
    )
}

/// A conflict-copy name not claimed by `is_taken`
///
/// Tries the plain deterministic name first, then appends ` 2`..` 99`.
/// Returns `None` if every candidate is taken.
pub fn available_conflict_name<F>(
    name: &str,
    detected_at: DateTime<Utc>,
    is_taken: F,
) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    let base = conflict_name(name, detected_at);
    if !is_taken(&base) {
        return Some(base);
    }
    let (stem, ext) = split_name(&base);
    for counter in 2..=MAX_COUNTER {
        let candidate = format!("{} {}{}", stem, counter, ext);
        if !is_taken(&candidate) {
            return Some(candidate);
        }
    }
    None
}
