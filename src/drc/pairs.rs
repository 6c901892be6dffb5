//! Candidate pair generation with bounding-box pruning
//!
//! Builds the list of patch pairs the expand-and-intersect engine has to
//! look at. An R-tree over patch bounding boxes keeps the enumeration
//! near-linear; the exact keep/discard decision is the conservative
//! clearance-expanded box test, so pruning may keep harmless pairs but
//! never drops a violating one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use geo::MultiPolygon;
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};

use crate::board::Board;
use crate::geometry::{assemble, Bbox, Paths, Point};
use crate::patches::PatchKey;
use crate::rules::RuleSet;

/// Extra slack added to every bounding-box test, in nanometers
pub(crate) const SAFETY_MARGIN: i64 = 10;

/// One patch as the clearance engine sees it: key, source rings,
/// assembled polygon and tight bounding box
pub(crate) struct PatchInfo<'a> {
    pub key: PatchKey,
    pub paths: &'a Paths,
    pub poly: MultiPolygon<f64>,
    pub bbox: Bbox,
}

/// An unordered patch pair that survived pruning, with its resolved
/// clearance
#[derive(Debug, Clone, Copy)]
pub(crate) struct CandidatePair {
    pub a: usize,
    pub b: usize,
    pub clearance: u64,
}

pub(crate) struct CandidateSet {
    pub pairs: Vec<CandidatePair>,
    /// How many kept pairs reference each (patch, clearance) combination
    pub neighbor_counts: HashMap<(usize, u64), usize>,
    /// Kept pairs whose clearance resolution matched no rule
    pub unmatched_pairs: usize,
}

struct BboxEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for BboxEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn aabb_of(bbox: &Bbox, margin: i64) -> AABB<[f64; 2]> {
    AABB::from_corners(
        [(bbox.left - margin) as f64, (bbox.bottom - margin) as f64],
        [(bbox.right + margin) as f64, (bbox.top + margin) as f64],
    )
}

/// Assemble polygons and compute bounding boxes for the filtered
/// patches, in parallel. Workers stop producing real work once the
/// cancellation flag is set; the caller re-checks after the join.
pub(crate) fn prepare_patches<'a>(
    entries: Vec<(PatchKey, &'a Paths)>,
    cancel: &AtomicBool,
) -> Vec<PatchInfo<'a>> {
    entries
        .into_par_iter()
        .map(|(key, paths)| {
            if cancel.load(Ordering::Relaxed) {
                return PatchInfo {
                    key,
                    paths,
                    poly: MultiPolygon::new(vec![]),
                    bbox: Bbox::from_point(Point::new(0, 0)),
                };
            }
            let poly = assemble(paths, key.patch_type.fill_rule());
            // empty patches are filtered out upstream
            let bbox = Bbox::from_paths(paths).expect("patch with no vertices");
            PatchInfo {
                key,
                paths,
                poly,
                bbox,
            }
        })
        .collect()
}

/// Enumerate unordered candidate pairs over the prepared patches.
///
/// A pair is kept when the nets differ, the layer ranges share at least
/// one copper layer, and the boxes expanded by the resolved clearance
/// plus the safety margin overlap.
pub(crate) fn build_pairs(
    patches: &[PatchInfo<'_>],
    board: &Board,
    rules: &RuleSet,
    cancel: &AtomicBool,
) -> CandidateSet {
    let query_margin = rules.max_clearance() as i64 + SAFETY_MARGIN;
    let tree = RTree::bulk_load(
        patches
            .iter()
            .enumerate()
            .map(|(index, p)| BboxEntry {
                index,
                envelope: aabb_of(&p.bbox, 0),
            })
            .collect(),
    );

    let mut pairs: Vec<(CandidatePair, bool)> = (0..patches.len())
        .into_par_iter()
        .flat_map(|i| {
            if cancel.load(Ordering::Relaxed) {
                return Vec::new();
            }
            let a = &patches[i];
            let search = aabb_of(&a.bbox, query_margin);
            let mut found = Vec::new();
            for entry in tree.locate_in_envelope_intersecting(&search) {
                let j = entry.index;
                // each unordered pair once
                if j <= i {
                    continue;
                }
                let b = &patches[j];
                if a.key.net == b.key.net {
                    continue;
                }
                let Some(isect) = a.key.layer.intersection(&b.key.layer) else {
                    continue;
                };
                let layer_scope = board.copper_layers_in(&isect);
                if layer_scope.is_empty() {
                    continue;
                }
                let resolved = rules.resolve_clearance(
                    (a.key.patch_type, a.key.net),
                    (b.key.patch_type, b.key.net),
                    &layer_scope,
                );
                let grow = resolved.distance as i64 + SAFETY_MARGIN;
                if a.bbox.expand(grow).overlaps(&b.bbox) {
                    found.push((
                        CandidatePair {
                            a: i,
                            b: j,
                            clearance: resolved.distance,
                        },
                        resolved.matched,
                    ));
                }
            }
            found
        })
        .collect();

    // deterministic order regardless of worker scheduling
    pairs.sort_by_key(|(p, _)| (p.a, p.b));

    let mut neighbor_counts: HashMap<(usize, u64), usize> = HashMap::new();
    let mut unmatched_pairs = 0;
    for (pair, matched) in &pairs {
        *neighbor_counts.entry((pair.a, pair.clearance)).or_default() += 1;
        *neighbor_counts.entry((pair.b, pair.clearance)).or_default() += 1;
        if !matched {
            unmatched_pairs += 1;
        }
    }

    CandidateSet {
        pairs: pairs.into_iter().map(|(p, _)| p).collect(),
        neighbor_counts,
        unmatched_pairs,
    }
}
