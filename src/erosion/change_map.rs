//! Deferred elevation deltas and their smoothed merge into the field.

use rayon::prelude::*;

use super::config::BlurConfig;
use crate::terrain::HeightField;

/// Pending, unapplied elevation deltas for a grid.
///
/// Brush writes land here instead of in the [`HeightField`], so the mesh
/// consumer only has to react once per merge.
#[derive(Debug, Clone, Default)]
pub struct ChangeMap {
    width: usize,
    height: usize,
    deltas: Vec<f32>,
}

impl ChangeMap {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            deltas: vec![0.0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Reallocates (zeroed) if the dimensions differ from the current allocation.
    ///
    /// Returns true if a reallocation happened.
    pub fn ensure_size(&mut self, width: usize, height: usize) -> bool {
        if self.width == width && self.height == height && self.deltas.len() == width * height {
            return false;
        }
        *self = Self::new(width, height);
        true
    }

    pub fn deltas(&self) -> &[f32] {
        &self.deltas
    }

    pub fn deltas_mut(&mut self) -> &mut [f32] {
        &mut self.deltas
    }

    /// Returns true if any delta is non-zero.
    pub fn is_dirty(&self) -> bool {
        self.deltas.iter().any(|&d| d != 0.0)
    }

    pub fn clear(&mut self) {
        self.deltas.fill(0.0);
    }

    /// Adds the pending deltas to `field` and zeroes the map.
    ///
    /// With `blur`, the map is box-blurred and the result blended with the raw
    /// map as `raw * (1 - blend) + blurred * blend` before being added.
    pub fn apply(&mut self, field: &mut HeightField, blur: Option<BlurConfig>) {
        self.ensure_size(field.width(), field.height());

        match blur {
            Some(cfg) if cfg.radius > 0 && cfg.blend != 0.0 => {
                let blurred = box_blur(&self.deltas, self.width, self.height, cfg.radius as usize);
                let blend = cfg.blend;
                field
                    .heights_mut()
                    .par_iter_mut()
                    .zip(self.deltas.par_iter().zip(blurred.par_iter()))
                    .for_each(|(h, (&raw, &smooth))| {
                        *h += raw * (1.0 - blend) + smooth * blend;
                    });
            }
            _ => {
                field
                    .heights_mut()
                    .par_iter_mut()
                    .zip(self.deltas.par_iter())
                    .for_each(|(h, &d)| *h += d);
            }
        }

        self.clear();
    }
}

/// Separable box blur; windows are truncated at the grid edges and averaged
/// over the cells that remain.
fn box_blur(src: &[f32], width: usize, height: usize, radius: usize) -> Vec<f32> {
    debug_assert_eq!(src.len(), width * height);
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let mut horizontal = vec![0.0f32; src.len()];
    horizontal
        .par_chunks_mut(width)
        .zip(src.par_chunks(width))
        .for_each(|(out_row, in_row)| {
            for x in 0..width {
                let lo = x.saturating_sub(radius);
                let hi = (x + radius).min(width - 1);
                let sum: f32 = in_row[lo..=hi].iter().sum();
                out_row[x] = sum / (hi - lo + 1) as f32;
            }
        });

    let mut out = vec![0.0f32; src.len()];
    out.par_chunks_mut(width).enumerate().for_each(|(y, out_row)| {
        let lo = y.saturating_sub(radius);
        let hi = (y + radius).min(height - 1);
        let n = (hi - lo + 1) as f32;
        for (x, value) in out_row.iter_mut().enumerate() {
            let mut sum = 0.0f32;
            for yy in lo..=hi {
                sum += horizontal[yy * width + x];
            }
            *value = sum / n;
        }
    });

    out
}
