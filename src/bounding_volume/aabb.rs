//! Axis Aligned Bounding Box.

use crate::math::{Point, Real, Vector};
use na;
use num::Bounded;

/// An Axis Aligned Bounding Box.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, PartialEq, Copy, Clone)]
#[repr(C)]
pub struct Aabb {
    /// The point with the smallest coordinates of this AABB.
    pub mins: Point<Real>,
    /// The point with the highest coordinates of this AABB.
    pub maxs: Point<Real>,
}

impl Aabb {
    /// Creates a new Aabb.
    ///
    /// # Arguments:
    ///   * `mins` - position of the point with the smallest coordinates.
    ///   * `maxs` - position of the point with the highest coordinates. Each component of `mins`
    ///     must be smaller than the related components of `maxs`.
    #[inline]
    pub fn new(mins: Point<Real>, maxs: Point<Real>) -> Aabb {
        Aabb { mins, maxs }
    }

    /// Creates an invalid Aabb with `mins` components set to `Real::max_values` and `maxs`
    /// components set to `-Real::max_values`.
    ///
    /// This is often used as the initial values of some Aabb merging algorithms: merging any
    /// concrete Aabb into it yields that concrete Aabb.
    #[inline]
    pub fn new_invalid() -> Self {
        Self::new(
            Vector::repeat(Real::max_value()).into(),
            Vector::repeat(-Real::max_value()).into(),
        )
    }

    /// Creates a new Aabb from its center and its half-extents.
    #[inline]
    pub fn from_half_extents(center: Point<Real>, half_extents: Vector<Real>) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    /// The center of this Aabb.
    #[inline]
    pub fn center(&self) -> Point<Real> {
        na::center(&self.mins, &self.maxs)
    }

    /// The extents of this Aabb.
    #[inline]
    pub fn extents(&self) -> Vector<Real> {
        self.maxs - self.mins
    }

    /// The volume of this Aabb.
    ///
    /// This is negative for the invalid Aabb; callers relying on a meaningful
    /// growth metric clamp it at zero.
    #[inline]
    pub fn volume(&self) -> Real {
        let extents = self.extents();
        extents.x * extents.y * extents.z
    }

    /// The exterior surface area of this Aabb.
    ///
    /// This is the cost metric ordering the treelet collection heap: expanding the
    /// node with the largest surface area reduces the SAH cost the most.
    #[inline]
    pub fn surface_area(&self) -> Real {
        let extents = self.extents();
        (extents.x * extents.y + extents.y * extents.z + extents.z * extents.x) * 2.0
    }

    /// The smallest Aabb containing both `self` and `other`.
    #[inline]
    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            mins: self.mins.inf(&other.mins),
            maxs: self.maxs.sup(&other.maxs),
        }
    }

    /// Enlarges `self` so it also contains `other`.
    #[inline]
    pub fn merge(&mut self, other: &Aabb) {
        self.mins = self.mins.inf(&other.mins);
        self.maxs = self.maxs.sup(&other.maxs);
    }

    /// Checks if this Aabb intersects `other`.
    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        na::partial_le(&self.mins, &other.maxs) && na::partial_ge(&self.maxs, &other.mins)
    }

    /// Checks if this Aabb fully encloses `other`.
    #[inline]
    pub fn contains(&self, other: &Aabb) -> bool {
        na::partial_le(&self.mins, &other.mins) && na::partial_ge(&self.maxs, &other.maxs)
    }
}
