//! Geometry for patch-based board checks
//!
//! Integer-nanometer primitives plus the polygon boolean/offset layer the
//! clearance and connectivity checks are built on.
//!
//! # Submodules
//! - `types` - Fixed-point primitives (Point, Path, Bbox, area, point-in-ring)
//! - `clip` - Polygon boolean and offset operations (union, intersection,
//!   difference, round-join offset, fill-rule-aware ring assembly)

mod clip;
mod types;

pub use types::{point_in_ring, signed_area_2x, Accumulator, Bbox, Coord, Path, Paths, Point, RingSide};

pub use clip::{
    assemble, difference, intersection, offset, to_paths, to_regions, union_all, FillRule, Region,
};
