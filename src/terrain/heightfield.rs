//! Square elevation grid shared between the terrain owner and the erosion core.

use glam::Vec2;
use thiserror::Error;

/// Errors raised when wrapping an existing buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeightFieldError {
    #[error("Buffer length {len} does not match {width}x{height}")]
    LengthMismatch { width: usize, height: usize, len: usize },
}

/// Height and gradient at a fractional grid position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightSample {
    pub height: f32,
    pub gradient: Vec2,
}

/// Flat row-major buffer of `width * height` elevations.
///
/// The erosion core borrows this mutably per operation and never resizes it.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightField {
    width: usize,
    height: usize,
    heights: Vec<f32>,
}

impl HeightField {
    /// Creates a field of the given size with every cell at zero.
    pub fn new(width: usize, height: usize) -> Self {
        Self::flat(width, height, 0.0)
    }

    /// Creates a field with every cell at `value`.
    pub fn flat(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            heights: vec![value; width * height],
        }
    }

    /// Wraps an existing row-major buffer.
    pub fn from_vec(
        width: usize,
        height: usize,
        heights: Vec<f32>,
    ) -> Result<Self, HeightFieldError> {
        if heights.len() != width * height {
            return Err(HeightFieldError::LengthMismatch {
                width,
                height,
                len: heights.len(),
            });
        }
        Ok(Self { width, height, heights })
    }

    /// Builds a field by evaluating `f(x, y)` at every cell.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut heights = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                heights.push(f(x, y));
            }
        }
        Self { width, height, heights }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_square(&self) -> bool {
        self.width == self.height
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    pub fn heights_mut(&mut self) -> &mut [f32] {
        &mut self.heights
    }

    /// Consumes the field and returns its buffer.
    pub fn into_heights(self) -> Vec<f32> {
        self.heights
    }

    /// Swaps in a buffer of identical length, returning the previous one.
    pub fn replace_heights(&mut self, heights: Vec<f32>) -> Result<Vec<f32>, HeightFieldError> {
        if heights.len() != self.heights.len() {
            return Err(HeightFieldError::LengthMismatch {
                width: self.width,
                height: self.height,
                len: heights.len(),
            });
        }
        Ok(std::mem::replace(&mut self.heights, heights))
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.heights[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        let i = self.index(x, y);
        self.heights[i] = value;
    }

    #[inline]
    pub fn add(&mut self, x: usize, y: usize, delta: f32) {
        let i = self.index(x, y);
        self.heights[i] += delta;
    }

    /// Returns true if `pos` lies inside `[0, width-1] x [0, height-1]`.
    ///
    /// NaN positions are never in bounds.
    #[inline]
    pub fn in_bounds(&self, pos: Vec2) -> bool {
        let max_x = self.width.saturating_sub(1) as f32;
        let max_y = self.height.saturating_sub(1) as f32;
        pos.x >= 0.0 && pos.y >= 0.0 && pos.x <= max_x && pos.y <= max_y
    }

    /// Bilinearly samples height and gradient at a fractional position.
    ///
    /// The cell origin is clamped to `[0, dim-2]` so the four corner lookups
    /// always stay inside the buffer, and the fractional offset is clamped to
    /// `[0, 1]`. Grids narrower than two cells return the first cell with a
    /// zero gradient.
    pub fn sample(&self, x: f32, y: f32) -> HeightSample {
        if self.width < 2 || self.height < 2 {
            return HeightSample {
                height: self.heights.first().copied().unwrap_or(0.0),
                gradient: Vec2::ZERO,
            };
        }

        let max_cx = (self.width - 2) as f32;
        let max_cy = (self.height - 2) as f32;
        let cx = x.floor().clamp(0.0, max_cx);
        let cy = y.floor().clamp(0.0, max_cy);
        let u = (x - cx).clamp(0.0, 1.0);
        let v = (y - cy).clamp(0.0, 1.0);

        let ix = cx as usize;
        let iy = cy as usize;
        let h00 = self.get(ix, iy);
        let h10 = self.get(ix + 1, iy);
        let h01 = self.get(ix, iy + 1);
        let h11 = self.get(ix + 1, iy + 1);

        let gradient = Vec2::new(
            (h10 - h00) * (1.0 - v) + (h11 - h01) * v,
            (h01 - h00) * (1.0 - u) + (h11 - h10) * u,
        );
        let height = h00 * (1.0 - u) * (1.0 - v)
            + h10 * u * (1.0 - v)
            + h01 * (1.0 - u) * v
            + h11 * u * v;

        HeightSample { height, gradient }
    }

    /// Computes the min and max height values.
    pub fn height_range(&self) -> (f32, f32) {
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for &h in &self.heights {
            min = min.min(h);
            max = max.max(h);
        }
        (min, max)
    }

    /// Sum of all elevations, accumulated in f64.
    pub fn total_mass(&self) -> f64 {
        self.heights.iter().map(|&h| h as f64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_vec_rejects_wrong_length() {
        let err = HeightField::from_vec(4, 4, vec![0.0; 15]).unwrap_err();
        assert_eq!(err, HeightFieldError::LengthMismatch { width: 4, height: 4, len: 15 });
    }

    #[test]
    fn sample_on_ramp_has_unit_gradient() {
        let field = HeightField::from_fn(8, 8, |x, _| x as f32);
        let s = field.sample(3.25, 4.5);
        assert!((s.height - 3.25).abs() < 1e-5);
        assert!((s.gradient.x - 1.0).abs() < 1e-5);
        assert!(s.gradient.y.abs() < 1e-5);
    }

    #[test]
    fn sample_clamps_outside_positions() {
        let field = HeightField::from_fn(4, 4, |x, y| (x + y) as f32);
        // Far outside in every direction; must not panic and must stay finite.
        for &(x, y) in &[(-10.0, -10.0), (3.0, 3.0), (100.0, 0.5), (0.5, 100.0)] {
            let s = field.sample(x, y);
            assert!(s.height.is_finite());
        }
        assert!((field.sample(3.0, 3.0).height - 6.0).abs() < 1e-5);
    }

    #[test]
    fn in_bounds_rejects_nan_and_edges() {
        let field = HeightField::new(16, 16);
        assert!(field.in_bounds(Vec2::new(0.0, 15.0)));
        assert!(!field.in_bounds(Vec2::new(-0.01, 3.0)));
        assert!(!field.in_bounds(Vec2::new(15.5, 3.0)));
        assert!(!field.in_bounds(Vec2::new(f32::NAN, 3.0)));
    }

    #[test]
    fn replace_heights_keeps_length() {
        let mut field = HeightField::new(2, 2);
        let old = field.replace_heights(vec![1.0; 4]).unwrap();
        assert_eq!(old, vec![0.0; 4]);
        assert_eq!(field.total_mass(), 4.0);
        assert!(field.replace_heights(vec![1.0; 3]).is_err());
    }
}
