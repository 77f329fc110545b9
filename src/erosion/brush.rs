//! Radius-weighted brush used by droplet erosion and deposition.

/// Spreads `amount` over the disc of cells around `(cx, cy)`.
///
/// Cells are taken from the square of side `2 * radius + 1` around
/// `floor(center)`. Each cell within Euclidean distance `radius` of the
/// fractional center is weighted by `radius - distance` (a linear cone that
/// reaches zero at the rim), and the weights are normalized to sum to one.
///
/// Normalization runs over the whole disc, including cells that fall outside
/// the grid; those cells are then skipped rather than clamped. A brush that
/// overlaps an edge therefore applies less than `amount` in total. If the disc
/// carries no weight at all the call does nothing.
///
/// # Arguments
/// * `buffer` - Row-major grid of `width * height` values
/// * `cx`, `cy` - Brush center in fractional grid coordinates
/// * `radius` - Brush radius in cells
/// * `amount` - Total quantity to distribute (negative to remove)
pub fn apply_radial_contribution(
    buffer: &mut [f32],
    width: usize,
    height: usize,
    cx: f32,
    cy: f32,
    radius: u32,
    amount: f32,
) {
    debug_assert_eq!(buffer.len(), width * height);
    if !(cx.is_finite() && cy.is_finite()) {
        return;
    }

    let r = radius as i64;
    let rf = radius as f32;
    let base_x = cx.floor() as i64;
    let base_y = cy.floor() as i64;

    let mut weight_sum = 0.0f32;
    for dy in -r..=r {
        for dx in -r..=r {
            let px = (base_x + dx) as f32;
            let py = (base_y + dy) as f32;
            let dist = ((px - cx).powi(2) + (py - cy).powi(2)).sqrt();
            if dist <= rf {
                weight_sum += (rf - dist).max(0.0);
            }
        }
    }

    if weight_sum <= 0.0 {
        return;
    }

    let (w, h) = (width as i64, height as i64);
    for dy in -r..=r {
        let y = base_y + dy;
        if y < 0 || y >= h {
            continue;
        }
        for dx in -r..=r {
            let x = base_x + dx;
            if x < 0 || x >= w {
                continue;
            }
            let dist = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
            if dist > rf {
                continue;
            }
            let weight = (rf - dist).max(0.0) / weight_sum;
            buffer[(y * w + x) as usize] += amount * weight;
        }
    }
}
