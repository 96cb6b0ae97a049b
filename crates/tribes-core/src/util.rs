//! Shared utility functions used across multiple modules.

use crate::error::{Error, Result};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Trim a required name and enforce a maximum length in characters.
pub fn normalize_name(value: &str, field: &str, max_len: usize) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{field} cannot be empty")));
    }
    if value.chars().count() > max_len {
        return Err(Error::InvalidInput(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(value.to_string())
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Convert a whole number of days to milliseconds, saturating on overflow.
pub const fn days_to_millis(days: i64) -> i64 {
    days.saturating_mul(MILLIS_PER_DAY)
}
