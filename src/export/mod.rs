//! Export module for saving height fields to image and RAW formats.
//!
//! Supports 16-bit PNG for universal compatibility and RAW formats
//! for game engine imports.

mod png;
mod raw;

pub use png::{export_heightfield_png, load_heightfield_png, PngExportError, PngExportOptions};
pub use raw::{expected_file_size, export_heightfield_raw, RawExportError, RawFormat};
