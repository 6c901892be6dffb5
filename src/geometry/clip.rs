//! Polygon boolean and offset operations
//!
//! Bridges integer-nanometer rings to the clipper engine via geo-clipper.
//! Patches arrive with normalized orientation (outer rings positive area,
//! holes negative), so ring assembly classifies by winding for nonzero
//! keys and by nesting depth for even-odd keys (the board outline).
//!
//! Coordinates are passed to the engine unscaled: they are already
//! integers, so a clipper scale factor of 1 is exact.

use geo::{Coord as GeoCoord, LineString, MultiPolygon, Polygon as GeoPolygon};
use geo_clipper::{Clipper, EndType, JoinType};

use super::types::{point_in_ring, signed_area_2x, Path, Paths, Point, RingSide};

/// Coordinates are integer nanometers, no further scaling needed
const CLIPPER_SCALE: f64 = 1.0;

/// Arc tolerance for round offset joins: 10 µm in nanometers
const ARC_TOLERANCE: f64 = 10e3;

/// Which regions of nested/overlapping rings count as filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRule {
    NonZero,
    EvenOdd,
}

/// An outer contour plus its holes, the decomposed form of one
/// contiguous filled region
#[derive(Debug, Clone)]
pub struct Region {
    pub contour: Path,
    pub holes: Vec<Path>,
}

fn ring_to_linestring(path: &[Point]) -> LineString<f64> {
    let mut coords: Vec<GeoCoord<f64>> = path
        .iter()
        .map(|p| GeoCoord {
            x: p.x as f64,
            y: p.y as f64,
        })
        .collect();
    // geo rings carry an explicit closing point
    if let (Some(first), Some(last)) = (coords.first().copied(), coords.last()) {
        if first != *last {
            coords.push(first);
        }
    }
    LineString::new(coords)
}

fn linestring_to_ring(ls: &LineString<f64>) -> Path {
    let mut points: Vec<Point> = ls
        .coords()
        .map(|c| Point::new(c.x.round() as i64, c.y.round() as i64))
        .collect();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

/// Assemble normalized closed rings into polygons with holes.
///
/// `FillRule::NonZero`: positive-area rings are outers, negative-area rings
/// are holes attached to the smallest outer containing them.
/// `FillRule::EvenOdd`: winding is ignored; rings at even nesting depth are
/// outers, odd-depth rings are holes of their immediate parent.
pub fn assemble(paths: &Paths, fill: FillRule) -> MultiPolygon<f64> {
    let rings: Vec<&Path> = paths.iter().filter(|p| p.len() >= 3).collect();
    if rings.is_empty() {
        return MultiPolygon::new(vec![]);
    }

    let (outer_idx, hole_parent): (Vec<usize>, Vec<(usize, usize)>) = match fill {
        FillRule::NonZero => {
            let mut outers = Vec::new();
            let mut holes = Vec::new();
            for (i, ring) in rings.iter().enumerate() {
                if signed_area_2x(ring) >= 0 {
                    outers.push(i);
                } else {
                    holes.push(i);
                }
            }
            let mut pairs = Vec::new();
            for &h in &holes {
                let probe = rings[h][0];
                let mut best: Option<(usize, i128)> = None;
                for &o in &outers {
                    if point_in_ring(probe, rings[o]) != RingSide::Outside {
                        let area = signed_area_2x(rings[o]).abs();
                        if best.map_or(true, |(_, a)| area < a) {
                            best = Some((o, area));
                        }
                    }
                }
                if let Some((o, _)) = best {
                    pairs.push((h, o));
                }
                // a hole with no containing outer is dropped
            }
            (outers, pairs)
        }
        FillRule::EvenOdd => {
            // nesting depth = number of other rings containing this one
            let depth: Vec<usize> = rings
                .iter()
                .enumerate()
                .map(|(i, ring)| {
                    rings
                        .iter()
                        .enumerate()
                        .filter(|(j, other)| {
                            *j != i && point_in_ring(ring[0], other) == RingSide::Inside
                        })
                        .count()
                })
                .collect();
            let outers: Vec<usize> = (0..rings.len()).filter(|&i| depth[i] % 2 == 0).collect();
            let mut pairs = Vec::new();
            for i in 0..rings.len() {
                if depth[i] % 2 == 1 {
                    let mut best: Option<(usize, i128)> = None;
                    for &o in &outers {
                        if depth[o] == depth[i] - 1
                            && point_in_ring(rings[i][0], rings[o]) == RingSide::Inside
                        {
                            let area = signed_area_2x(rings[o]).abs();
                            if best.map_or(true, |(_, a)| area < a) {
                                best = Some((o, area));
                            }
                        }
                    }
                    if let Some((o, _)) = best {
                        pairs.push((i, o));
                    }
                }
            }
            (outers, pairs)
        }
    };

    let polygons: Vec<GeoPolygon<f64>> = outer_idx
        .iter()
        .map(|&o| {
            let holes: Vec<LineString<f64>> = hole_parent
                .iter()
                .filter(|&&(_, parent)| parent == o)
                .map(|&(h, _)| ring_to_linestring(rings[h]))
                .collect();
            GeoPolygon::new(ring_to_linestring(rings[o]), holes)
        })
        .collect();

    MultiPolygon::new(polygons)
}

/// Decompose a boolean result into regions (contour + holes per polygon)
pub fn to_regions(multi: &MultiPolygon<f64>) -> Vec<Region> {
    multi
        .0
        .iter()
        .map(|poly| Region {
            contour: linestring_to_ring(poly.exterior()),
            holes: poly.interiors().iter().map(linestring_to_ring).collect(),
        })
        .collect()
}

/// Flatten a boolean result into plain rings (contours and holes)
pub fn to_paths(multi: &MultiPolygon<f64>) -> Paths {
    let mut out = Paths::new();
    for poly in &multi.0 {
        out.push(linestring_to_ring(poly.exterior()));
        for hole in poly.interiors() {
            out.push(linestring_to_ring(hole));
        }
    }
    out
}

/// Merge overlapping members of a multipolygon into maximal regions
pub fn union_all(multi: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    if multi.0.len() <= 1 {
        return multi.clone();
    }
    multi.union(&MultiPolygon::new(vec![]), CLIPPER_SCALE)
}

pub fn intersection(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    if a.0.is_empty() || b.0.is_empty() {
        return MultiPolygon::new(vec![]);
    }
    a.intersection(b, CLIPPER_SCALE)
}

pub fn difference(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    if a.0.is_empty() {
        return MultiPolygon::new(vec![]);
    }
    if b.0.is_empty() {
        return a.clone();
    }
    a.difference(b, CLIPPER_SCALE)
}

/// Offset outward (positive) or inward (negative) with round joins.
///
/// Offset-by-zero still runs through the engine so the result is a
/// cleaned copy of the input, matching the behavior clearance checks
/// rely on: touching-but-not-overlapping is not a violation.
pub fn offset(multi: &MultiPolygon<f64>, delta: i64) -> MultiPolygon<f64> {
    if multi.0.is_empty() {
        return MultiPolygon::new(vec![]);
    }
    multi.offset(
        delta as f64,
        JoinType::Round(ARC_TOLERANCE),
        EndType::ClosedPolygon,
        CLIPPER_SCALE,
    )
}
