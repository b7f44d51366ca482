//! Graded background lattice filling the domain beyond the boundary layers.
//!
//! Band `k` is a regular lattice of spacing `resolution * 2^k` restricted to a
//! shell of distances from the input surface. Bands are stacked outward from the
//! contour thickness, each [`BAND_CELLS`] of its own cells thick; the last band
//! extends to the domain boundary.

use num_traits::ToPrimitive;

use crate::config::GridConfig;
use crate::geometry::aabb::Aabb;
use crate::geometry::point::{Point3, Vector3};
use crate::spatial::bvh::Bvh;

/// Thickness of each grading band, in cells of that band.
pub const BAND_CELLS: f64 = 4.0;

/// `(spacing, lo, hi)` of each band: its lattice spacing and distance shell `[lo, hi)`
/// for a front of the given `thickness`.
#[must_use]
pub fn band_ranges(grid: &GridConfig, thickness: f64) -> Vec<(f64, f64, f64)> {
    let mut ranges = Vec::with_capacity(grid.layers);
    let mut lo = thickness + 0.5 * grid.resolution;
    let mut spacing = grid.resolution;
    for k in 0..grid.layers {
        let hi = if k + 1 == grid.layers {
            f64::INFINITY
        } else {
            lo + BAND_CELLS * spacing
        };
        ranges.push((spacing, lo, hi));
        lo = hi;
        spacing *= 2.0;
    }
    ranges
}

/// Cell-centered lattice of `spacing` over `bounds`.
fn lattice(bounds: &Aabb, spacing: f64) -> impl Iterator<Item = Point3> + '_ {
    let extent = bounds.extent();
    let counts: [usize; 3] =
        std::array::from_fn(|axis| (extent[axis] / spacing).floor().to_usize().unwrap_or(0));
    let [nx, ny, nz] = counts;
    (0..nz).flat_map(move |k| {
        (0..ny).flat_map(move |j| {
            (0..nx).map(move |i| {
                #[allow(clippy::cast_precision_loss)]
                let offset = Vector3::new(i as f64 + 0.5, j as f64 + 0.5, k as f64 + 0.5) * spacing;
                bounds.min + offset
            })
        })
    })
}

/// Background points for `bounds` around the surface indexed by `surface`.
///
/// A lattice point is kept if its distance to the surface falls in its band's
/// shell and, for a closed surface (`closed == true`), it lies outside the solid.
#[must_use]
pub fn background_points(
    bounds: &Aabb,
    surface: &Bvh,
    closed: bool,
    grid: &GridConfig,
    thickness: f64,
) -> Vec<Point3> {
    let mut points = Vec::new();
    if grid.resolution <= 0.0 || surface.is_empty() {
        return points;
    }
    for (band, (spacing, lo, hi)) in band_ranges(grid, thickness).into_iter().enumerate() {
        let before = points.len();
        points.extend(lattice(bounds, spacing).filter(|p| {
            surface
                .distance(p)
                .is_some_and(|d| d >= lo && d < hi)
                && !(closed && surface.contains_point(p))
        }));
        tracing::debug!(band, spacing, points = points.len() - before, "background band");
    }
    points
}
