//! Output file naming
//!
//! Saved files are named `<kind>_<millisecond-timestamp>.<ext>`.

use chrono::Utc;

/// File name prefix for still photos
pub const PHOTO_KIND: &str = "photo";

/// File name prefix for assembled recordings
pub const RECORDING_KIND: &str = "recording";

/// Build a file name stamped with the current Unix time in milliseconds
pub fn timestamped_filename(kind: &str, extension: &str) -> String {
    filename_at(kind, Utc::now().timestamp_millis(), extension)
}

/// Build a file name for an explicit timestamp
pub fn filename_at(kind: &str, unix_ms: i64, extension: &str) -> String {
    format!("{kind}_{unix_ms}.{extension}")
}

/// Split a generated file name back into its kind, timestamp and extension
pub fn parse_filename(name: &str) -> Option<(&str, i64, &str)> {
    let (stem, extension) = name.rsplit_once('.')?;
    let (kind, stamp) = stem.rsplit_once('_')?;
    if kind.is_empty() || extension.is_empty() {
        return None;
    }
    Some((kind, stamp.parse().ok()?, extension))
}
