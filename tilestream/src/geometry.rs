//! Axis-aligned range bookkeeping for tile volumes.
//!
//! Tiles only need enough geometry to describe their bounding volumes and to
//! split a parent volume into child volumes. Points are `glam::DVec3`.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// An axis-aligned 3D range.
///
/// A *null* range has `low > high` on every axis and contains nothing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Range3d {
    pub low: DVec3,
    pub high: DVec3,
}

impl Range3d {
    /// Creates a range from its corners without normalizing them.
    pub fn new(low: DVec3, high: DVec3) -> Self {
        Self { low, high }
    }

    /// Creates a range from two arbitrary corners.
    pub fn from_corners(a: DVec3, b: DVec3) -> Self {
        Self {
            low: a.min(b),
            high: a.max(b),
        }
    }

    /// The null (empty) range.
    pub fn null() -> Self {
        Self {
            low: DVec3::splat(f64::MAX),
            high: DVec3::splat(-f64::MAX),
        }
    }

    /// Returns true if the range is empty on any axis.
    pub fn is_null(&self) -> bool {
        self.low.x > self.high.x || self.low.y > self.high.y || self.low.z > self.high.z
    }

    /// Grows the range to include `point`.
    pub fn extend_point(&mut self, point: DVec3) {
        self.low = self.low.min(point);
        self.high = self.high.max(point);
    }

    pub fn contains_point(&self, point: DVec3) -> bool {
        !self.is_null() && point.cmpge(self.low).all() && point.cmple(self.high).all()
    }

    pub fn x_length(&self) -> f64 {
        (self.high.x - self.low.x).max(0.0)
    }

    pub fn y_length(&self) -> f64 {
        (self.high.y - self.low.y).max(0.0)
    }

    pub fn z_length(&self) -> f64 {
        (self.high.z - self.low.z).max(0.0)
    }

    /// Length of the longest axis, or zero for a null range.
    pub fn max_length(&self) -> f64 {
        if self.is_null() {
            return 0.0;
        }
        self.x_length().max(self.y_length()).max(self.z_length())
    }

    pub fn center(&self) -> DVec3 {
        (self.low + self.high) * 0.5
    }

    /// Returns true if both ranges agree within `tolerance` on every coordinate.
    pub fn is_almost_equal(&self, other: &Range3d, tolerance: f64) -> bool {
        self.low.abs_diff_eq(other.low, tolerance) && self.high.abs_diff_eq(other.high, tolerance)
    }

    /// Returns the child range for the sub-volume selected by `octant`.
    ///
    /// Bit 0 selects the upper half in x, bit 1 in y, bit 2 in z. When
    /// `is_3d` is false only x and y are split and z is kept whole.
    pub fn subdivide(&self, octant: u8, is_3d: bool) -> Range3d {
        let mid = self.center();
        let pick = |bit: u8, low: f64, mid: f64, high: f64| -> (f64, f64) {
            if octant & bit == 0 {
                (low, mid)
            } else {
                (mid, high)
            }
        };

        let (lx, hx) = pick(1, self.low.x, mid.x, self.high.x);
        let (ly, hy) = pick(2, self.low.y, mid.y, self.high.y);
        let (lz, hz) = if is_3d {
            pick(4, self.low.z, mid.z, self.high.z)
        } else {
            (self.low.z, self.high.z)
        };

        Range3d::new(DVec3::new(lx, ly, lz), DVec3::new(hx, hy, hz))
    }
}

impl Default for Range3d {
    fn default() -> Self {
        Self::null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_range() {
        let range = Range3d::null();
        assert!(range.is_null());
        assert_eq!(range.max_length(), 0.0);
        assert!(!range.contains_point(DVec3::ZERO));
    }

    #[test]
    fn test_extend_point() {
        let mut range = Range3d::null();
        range.extend_point(DVec3::new(1.0, 2.0, 3.0));
        range.extend_point(DVec3::new(-1.0, 0.0, 5.0));

        assert!(!range.is_null());
        assert_eq!(range.low, DVec3::new(-1.0, 0.0, 3.0));
        assert_eq!(range.high, DVec3::new(1.0, 2.0, 5.0));
    }

    #[test]
    fn test_subdivide_octree() {
        let range = Range3d::new(DVec3::ZERO, DVec3::splat(8.0));
        let child = range.subdivide(0b101, true);

        assert_eq!(child.low, DVec3::new(4.0, 0.0, 4.0));
        assert_eq!(child.high, DVec3::new(8.0, 4.0, 8.0));
    }

    #[test]
    fn test_subdivide_quadtree_keeps_z() {
        let range = Range3d::new(DVec3::new(0.0, 0.0, -1.0), DVec3::new(8.0, 8.0, 1.0));
        let child = range.subdivide(0b111, false);

        assert_eq!(child.low, DVec3::new(4.0, 4.0, -1.0));
        assert_eq!(child.high, DVec3::new(8.0, 8.0, 1.0));
    }

    #[test]
    fn test_almost_equal() {
        let a = Range3d::new(DVec3::new(-2.5, -5.0, 0.0), DVec3::new(2.5, 5.0, 0.0));
        let b = Range3d::new(DVec3::new(-2.5001, -5.0, 0.0), DVec3::new(2.5, 5.0002, 0.0));
        assert!(a.is_almost_equal(&b, 5.0e-4));
        assert!(!a.is_almost_equal(&b, 1.0e-5));
    }
}
