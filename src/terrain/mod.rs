//! Terrain data owned by the caller and borrowed by the erosion core.

mod heightfield;

pub use heightfield::{HeightField, HeightFieldError, HeightSample};
