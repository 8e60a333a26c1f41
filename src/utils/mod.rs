//! Shared utilities

pub mod error;
pub mod filename;

pub use error::{AppError, AppResult};
pub use filename::{filename_at, timestamped_filename, PHOTO_KIND, RECORDING_KIND};
