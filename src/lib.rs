/*!
wide-bvh
========

**wide-bvh** is an experimental broad-phase acceleration structure written
with the rust programming language: a bounding volume hierarchy whose
internal nodes hold a fixed number of children (2, 4, 8, 16, or 32) instead
of the usual binary shape.

The tree indexes arbitrary objects by their axis-aligned bounding boxes and
answers box-overlap queries in sub-linear time. It is built on-line, one
leaf at a time, with a cheap volume-growth heuristic; a bottom-up refit pass
refreshes the bounds after the leaves move; and a treelet collector selects
bounded connected regions of a degraded tree for external rebalancing.

All linear algebra comes from [`nalgebra`](https://nalgebra.rs), re-exported
as [`na`].
*/

#![deny(non_camel_case_types)]
#![deny(unused_parens)]
#![deny(non_upper_case_globals)]
#![deny(unused_results)]
#![warn(missing_docs)]
#![warn(unused_imports)]
#![allow(missing_copy_implementations)]
#![allow(clippy::module_inception)]
#![allow(clippy::manual_range_contains)] // This usually makes it way more verbose that it could be.
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

#[cfg(feature = "serde-serialize")]
#[macro_use]
extern crate serde;
#[cfg(test)]
#[macro_use]
extern crate approx;
extern crate num_traits as num;

pub extern crate nalgebra as na;

pub mod bounding_volume;
pub mod partitioning;
pub mod utils;

mod real {
    /// The scalar type used throughout this crate.
    #[cfg(feature = "f64")]
    pub use f64 as Real;

    /// The scalar type used throughout this crate.
    #[cfg(not(feature = "f64"))]
    pub use f32 as Real;
}

/// Aliases for the mathematical types used throughout this crate.
pub mod math {
    pub use super::real::*;
    pub use na::{Matrix4, Point3, UnitQuaternion, Vector3};

    /// The dimension of the space.
    pub const DIM: usize = 3;

    /// The point type.
    pub use Point3 as Point;

    /// The vector type.
    pub use Vector3 as Vector;

    /// The homogeneous transformation matrix type.
    pub use Matrix4 as HomogeneousMatrix;

    /// The rotation type.
    pub type Rotation<N> = UnitQuaternion<N>;
}
