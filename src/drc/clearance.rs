//! Copper clearance check: the parallel expand-and-intersect engine
//!
//! For every candidate pair one member is grown by the resolved clearance
//! and intersected with the other; a non-empty intersection is a
//! violation. Expansion work is planned up front so that a patch needing
//! the same clearance for several neighbors is offset exactly once, then
//! all offsets and all intersections run as two parallel phases.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use geo::MultiPolygon;
use log::info;
use rayon::prelude::*;

use crate::drc::pairs::{build_pairs, prepare_patches, CandidateSet, PatchInfo};
use crate::drc::result::{CheckError, CheckLevel, CheckResult};
use crate::drc::{CheckContext, StatusCb};
use crate::geometry::{self, Accumulator};
use crate::patches::{PatchKey, PatchType};

/// Patches taking part in the copper clearance check: everything with
/// copper presence except artwork and non-plated holes
fn filter_patch(ctx: &CheckContext<'_>, key: &PatchKey) -> bool {
    if matches!(
        key.patch_type,
        PatchType::Other | PatchType::Text | PatchType::HoleNpth | PatchType::BoardEdge
    ) {
        return false;
    }
    ctx.board.has_copper_in(&key.layer)
}

struct PlannedPair {
    /// Index into the expansion table
    expanded: usize,
    /// Patch index of the member kept at original size
    other: usize,
    a: usize,
    b: usize,
    clearance: u64,
}

/// Assign every pair an expansion slot. Slots are shared between pairs
/// whose expanded member and clearance agree; when neither member has a
/// slot yet, the one with fewer neighbor references gets expanded.
fn plan_expansions(set: &CandidateSet) -> (Vec<(usize, u64)>, Vec<PlannedPair>) {
    let mut slots: HashMap<(usize, u64), usize> = HashMap::new();
    let mut to_expand: Vec<(usize, u64)> = Vec::new();
    let mut planned = Vec::with_capacity(set.pairs.len());

    for pair in &set.pairs {
        let key_a = (pair.a, pair.clearance);
        let key_b = (pair.b, pair.clearance);
        let (slot, other) = if let Some(&slot) = slots.get(&key_a) {
            (slot, pair.b)
        } else if let Some(&slot) = slots.get(&key_b) {
            (slot, pair.a)
        } else {
            let neighbors_a = set.neighbor_counts[&key_a];
            let neighbors_b = set.neighbor_counts[&key_b];
            let expand = if neighbors_b < neighbors_a {
                pair.b
            } else {
                pair.a
            };
            let slot = to_expand.len();
            to_expand.push((expand, pair.clearance));
            slots.insert((expand, pair.clearance), slot);
            (slot, if expand == pair.a { pair.b } else { pair.a })
        };
        planned.push(PlannedPair {
            expanded: slot,
            other,
            a: pair.a,
            b: pair.b,
            clearance: pair.clearance,
        });
    }
    (to_expand, planned)
}

fn intersect_pair(
    ctx: &CheckContext<'_>,
    patches: &[PatchInfo<'_>],
    expanded: &MultiPolygon<f64>,
    pair: &PlannedPair,
) -> Vec<CheckError> {
    let isect = geometry::intersection(expanded, &patches[pair.other].poly);
    if isect.0.is_empty() {
        return Vec::new();
    }

    let key1 = patches[pair.a].key;
    let key2 = patches[pair.b].key;

    // deliberate short between the tie's declared partner nets
    if (key1.patch_type == PatchType::NetTie || key2.patch_type == PatchType::NetTie)
        && ctx.board.is_tie_pair(key1.net, key2.net)
    {
        return Vec::new();
    }

    let layer_isect = key1
        .layer
        .intersection(&key2.layer)
        .expect("candidate pair without layer overlap");

    geometry::to_regions(&isect)
        .into_iter()
        .map(|region| {
            let mut error = CheckError::new(
                CheckLevel::Fail,
                format!(
                    "{}{} near {}{} on layer {}",
                    key1.patch_type.name(),
                    ctx.board.net_name_tag(key1.net),
                    key2.patch_type.name(),
                    ctx.board.net_name_tag(key2.net),
                    ctx.board.range_name(&layer_isect),
                ),
            );
            let mut acc = Accumulator::new();
            for p in &region.contour {
                acc.accumulate(*p);
            }
            error.location = acc.get();
            error.layers = ctx.board.copper_layers_in(&layer_isect);
            error.error_polygons.push(region.contour);
            error.error_polygons.extend(region.holes);
            error
        })
        .collect()
}

/// Run the copper-to-copper clearance check
pub fn check_clearance_copper(
    ctx: &CheckContext<'_>,
    status_cb: StatusCb<'_>,
    cancel: &AtomicBool,
) -> CheckResult {
    let start = Instant::now();
    let mut r = CheckResult::new();
    r.level = CheckLevel::Pass;
    if r.check_cancelled(cancel) {
        return r;
    }

    status_cb("1/5 Getting patches");
    let entries: Vec<(PatchKey, &geometry::Paths)> = ctx
        .store
        .iter()
        .filter(|(key, paths)| filter_patch(ctx, key) && paths.iter().any(|p| !p.is_empty()))
        .map(|(key, paths)| (*key, paths))
        .collect();

    status_cb("2/5 Calculating bounding boxes");
    let patches = prepare_patches(entries, cancel);
    if r.check_cancelled(cancel) {
        return r;
    }

    status_cb("3/5 Creating patch pairs");
    let set = build_pairs(&patches, ctx.board, ctx.rules, cancel);
    if r.check_cancelled(cancel) {
        return r;
    }

    let (to_expand, planned) = plan_expansions(&set);

    let n_expand = to_expand.len();
    let expand_counter = AtomicUsize::new(0);
    let expanded: Vec<MultiPolygon<f64>> = to_expand
        .par_iter()
        .map(|&(patch, clearance)| {
            if cancel.load(Ordering::Relaxed) {
                return MultiPolygon::new(vec![]);
            }
            let done = expand_counter.fetch_add(1, Ordering::Relaxed) + 1;
            status_cb(&format!("4/5 Expanding patch {done}/{n_expand}"));
            geometry::offset(&patches[patch].poly, clearance as i64)
        })
        .collect();
    if r.check_cancelled(cancel) {
        return r;
    }

    let n_pairs = planned.len();
    let pair_counter = AtomicUsize::new(0);
    let mut errors: Vec<CheckError> = planned
        .par_iter()
        .flat_map(|pair| {
            if cancel.load(Ordering::Relaxed) {
                return Vec::new();
            }
            let done = pair_counter.fetch_add(1, Ordering::Relaxed) + 1;
            status_cb(&format!("5/5 Checking patch pair {done}/{n_pairs}"));
            intersect_pair(ctx, &patches, &expanded[pair.expanded], pair)
        })
        .collect();
    if r.check_cancelled(cancel) {
        return r;
    }

    if set.unmatched_pairs > 0 {
        errors.push(CheckError::new(
            CheckLevel::Warn,
            format!(
                "No clearance rule matched {} patch pair(s); a clearance of 0 was used",
                set.unmatched_pairs
            ),
        ));
    }

    r.errors = errors;
    r.update();
    info!(
        "clearance check: {} patches, {} pairs, {} expansions, {} errors in {:?}",
        patches.len(),
        n_pairs,
        n_expand,
        r.errors.len(),
        start.elapsed()
    );
    r
}
