//! RAW heightmap export for game engine imports.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use crate::terrain::HeightField;

/// Errors that can occur during RAW export.
#[derive(Error, Debug)]
pub enum RawExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid height range: min ({0}) >= max ({1})")]
    InvalidHeightRange(f32, f32),
}

/// RAW export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawFormat {
    /// 16-bit unsigned integer, little-endian (Unity default).
    #[default]
    R16LittleEndian,
    /// 16-bit unsigned integer, big-endian.
    R16BigEndian,
    /// 32-bit float, little-endian (high precision).
    R32Float,
}

/// Exports a field as a headerless RAW heightmap.
///
/// `min_height` and `max_height` normalize the 16-bit formats and are
/// ignored for [`RawFormat::R32Float`].
pub fn export_heightfield_raw(
    field: &HeightField,
    path: &Path,
    format: RawFormat,
    min_height: f32,
    max_height: f32,
) -> Result<(), RawExportError> {
    if format != RawFormat::R32Float && min_height >= max_height {
        return Err(RawExportError::InvalidHeightRange(min_height, max_height));
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let range = max_height - min_height;
    let quantize = |h: f32| (((h - min_height) / range).clamp(0.0, 1.0) * 65535.0) as u16;

    match format {
        RawFormat::R16LittleEndian => {
            for &h in field.heights() {
                writer.write_all(&quantize(h).to_le_bytes())?;
            }
        }
        RawFormat::R16BigEndian => {
            for &h in field.heights() {
                writer.write_all(&quantize(h).to_be_bytes())?;
            }
        }
        RawFormat::R32Float => {
            for &h in field.heights() {
                writer.write_all(&h.to_le_bytes())?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}

/// Returns the expected file size for a RAW export.
pub fn expected_file_size(width: usize, height: usize, format: RawFormat) -> u64 {
    let cells = (width as u64) * (height as u64);
    match format {
        RawFormat::R16LittleEndian | RawFormat::R16BigEndian => cells * 2,
        RawFormat::R32Float => cells * 4,
    }
}
