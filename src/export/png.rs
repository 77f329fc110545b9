//! 16-bit PNG import and export for height fields.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageBuffer, ImageEncoder, Luma};
use thiserror::Error;

use crate::terrain::{HeightField, HeightFieldError};

/// Errors that can occur during PNG import or export.
#[derive(Error, Debug)]
pub enum PngExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid height range: min ({0}) >= max ({1})")]
    InvalidHeightRange(f32, f32),
    #[error(transparent)]
    Field(#[from] HeightFieldError),
}

/// Options for PNG export.
#[derive(Debug, Clone)]
pub struct PngExportOptions {
    /// Height mapped to black.
    pub min_height: f32,
    /// Height mapped to white.
    pub max_height: f32,
    /// PNG compression type.
    pub compression: CompressionType,
    /// PNG filter type.
    pub filter: FilterType,
}

impl Default for PngExportOptions {
    fn default() -> Self {
        Self {
            min_height: 0.0,
            max_height: 1.0,
            compression: CompressionType::Default,
            filter: FilterType::Adaptive,
        }
    }
}

impl PngExportOptions {
    /// Creates options spanning the field's own height range.
    ///
    /// A perfectly flat field gets a unit-wide range so export still succeeds.
    pub fn auto_range(field: &HeightField) -> Self {
        let (min, mut max) = field.height_range();
        if !(max > min) {
            max = min + 1.0;
        }
        Self {
            min_height: min,
            max_height: max,
            ..Default::default()
        }
    }
}

/// Exports a field as a 16-bit grayscale PNG.
///
/// # Arguments
/// * `field` - The field to export
/// * `path` - Output file path
/// * `options` - Export options including height range for normalization
pub fn export_heightfield_png(
    field: &HeightField,
    path: &Path,
    options: &PngExportOptions,
) -> Result<(), PngExportError> {
    let min = options.min_height;
    let max = options.max_height;
    if min >= max {
        return Err(PngExportError::InvalidHeightRange(min, max));
    }

    let (width, height) = (field.width() as u32, field.height() as u32);
    let range = max - min;

    let mut img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let h = field.get(x as usize, y as usize);
            let normalized = ((h - min) / range).clamp(0.0, 1.0);
            img.put_pixel(x, y, Luma([(normalized * 65535.0) as u16]));
        }
    }

    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let encoder = PngEncoder::new_with_quality(writer, options.compression, options.filter);
    let byte_slice: &[u8] = bytemuck::cast_slice(img.as_raw());
    encoder.write_image(byte_slice, width, height, image::ExtendedColorType::L16)?;

    Ok(())
}

/// Loads a grayscale PNG as a field with heights in `[0, 1]`.
///
/// Any bit depth is accepted; color images are converted to luma.
pub fn load_heightfield_png(path: &Path) -> Result<HeightField, PngExportError> {
    let img = image::open(path)?.to_luma16();
    let (width, height) = img.dimensions();
    let heights = img.into_raw().into_iter().map(|v| v as f32 / 65535.0).collect();
    Ok(HeightField::from_vec(width as usize, height as usize, heights)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn export_then_load_preserves_shape() {
        let field = HeightField::from_fn(33, 33, |x, y| (x + y) as f32 / 64.0);
        let dir = tempdir().unwrap();
        let path = dir.path().join("terrain.png");

        export_heightfield_png(&field, &path, &PngExportOptions::default()).unwrap();
        let loaded = load_heightfield_png(&path).unwrap();

        assert_eq!((loaded.width(), loaded.height()), (33, 33));
        for (a, b) in field.heights().iter().zip(loaded.heights()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn invalid_height_range_is_rejected() {
        let field = HeightField::new(8, 8);
        let dir = tempdir().unwrap();
        let options = PngExportOptions {
            min_height: 1.0,
            max_height: -1.0,
            ..Default::default()
        };
        let result = export_heightfield_png(&field, &dir.path().join("bad.png"), &options);
        assert!(matches!(result, Err(PngExportError::InvalidHeightRange(..))));
    }

    #[test]
    fn auto_range_handles_flat_fields() {
        let mut field = HeightField::flat(4, 4, 0.25);
        let flat = PngExportOptions::auto_range(&field);
        assert!(flat.max_height > flat.min_height);

        field.set(3, 3, 0.75);
        let options = PngExportOptions::auto_range(&field);
        assert_eq!(options.min_height, 0.25);
        assert_eq!(options.max_height, 0.75);
    }
}
