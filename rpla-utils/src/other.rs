//! Module containing some utility functions that didn't fit anywhere else.

use time::{format_description, OffsetDateTime};

/// Produces a timestamp `String` of the current time in YYYY-MM-DD_HH-mm-SS format.
pub fn get_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    format_description::parse("[year]-[month]-[day]_[hour]-[minute]-[second]")
        .ok()
        .and_then(|format| now.format(&format).ok())
        .unwrap_or_else(|| now.unix_timestamp().to_string())
}

/// Returns `true` if the given answer to a yes/no prompt should be read as a "yes". Anything
/// else, including an empty answer, is a "no".
pub fn is_yes(answer: impl AsRef<str>) -> bool {
    matches!(
        answer.as_ref().trim().to_lowercase().as_str(),
        "y" | "yes"
    )
}
