//! Clearance of copper against the non-copper categories
//!
//! Three sub-checks share the copper-other rule matrix: copper against
//! non-plated holes, copper against other artwork (silkscreen, text) per
//! layer, and copper against the board edge. Candidate counts here are
//! small, so the work runs sequentially with cancellation polls, as the
//! pair explosion the parallel engine exists for does not occur.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use geo::MultiPolygon;
use log::info;

use crate::drc::pairs::prepare_patches;
use crate::drc::result::{CheckError, CheckLevel, CheckResult};
use crate::drc::{CheckContext, StatusCb};
use crate::geometry::{self, Accumulator, Region};
use crate::patches::{PatchKey, PatchType};

fn is_copper_target(ctx: &CheckContext<'_>, key: &PatchKey) -> bool {
    !matches!(
        key.patch_type,
        PatchType::Other | PatchType::Text | PatchType::HoleNpth | PatchType::BoardEdge
    ) && ctx.board.has_copper_in(&key.layer)
}

fn is_other_artwork(patch_type: PatchType) -> bool {
    matches!(patch_type, PatchType::Other | PatchType::Text)
}

fn region_errors(
    isect: &MultiPolygon<f64>,
    comment: &str,
    layers: Vec<i32>,
    errors: &mut Vec<CheckError>,
) {
    for region in geometry::to_regions(isect) {
        let Region { contour, holes } = region;
        let mut error = CheckError::new(CheckLevel::Fail, comment);
        let mut acc = Accumulator::new();
        for p in &contour {
            acc.accumulate(*p);
        }
        error.location = acc.get();
        error.layers = layers.clone();
        error.error_polygons.push(contour);
        error.error_polygons.extend(holes);
        errors.push(error);
    }
}

/// Run the copper-vs-other clearance check (NPTH holes, artwork, board
/// edge)
pub fn check_clearance_copper_other(
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

    status_cb("Getting patches");
    let entries: Vec<(PatchKey, &geometry::Paths)> = ctx
        .store
        .iter()
        .filter(|(_, paths)| paths.iter().any(|p| !p.is_empty()))
        .map(|(key, paths)| (*key, paths))
        .collect();
    let patches = prepare_patches(entries, cancel);
    if r.check_cancelled(cancel) {
        return r;
    }

    let copper: Vec<usize> = (0..patches.len())
        .filter(|&i| is_copper_target(ctx, &patches[i].key))
        .collect();

    let mut errors = Vec::new();
    let mut unmatched = 0usize;

    // copper against non-plated holes
    {
        let npth_rings: geometry::Paths = patches
            .iter()
            .filter(|p| p.key.patch_type == PatchType::HoleNpth)
            .flat_map(|p| p.paths.iter().cloned())
            .collect();
        if !npth_rings.is_empty() {
            let npth = geometry::assemble(&npth_rings, PatchType::HoleNpth.fill_rule());
            let mut expanded_cache: HashMap<u64, MultiPolygon<f64>> = HashMap::new();
            let n = copper.len();
            for (done, &i) in copper.iter().enumerate() {
                if r.check_cancelled(cancel) {
                    return r;
                }
                status_cb(&format!("Checking NPTH clearance {}/{}", done + 1, n));
                let patch = &patches[i];
                let layer_scope = ctx.board.copper_layers_in(&patch.key.layer);
                let resolved = ctx.rules.resolve_clearance_other(
                    (patch.key.patch_type, patch.key.net),
                    PatchType::HoleNpth,
                    &layer_scope,
                );
                if !resolved.matched {
                    unmatched += 1;
                }
                let expanded = expanded_cache
                    .entry(resolved.distance)
                    .or_insert_with(|| geometry::offset(&npth, resolved.distance as i64));
                let isect = geometry::intersection(expanded, &patch.poly);
                if !isect.0.is_empty() {
                    region_errors(
                        &isect,
                        &format!(
                            "{}{} near NPTH hole",
                            patch.key.patch_type.name(),
                            ctx.board.net_name_tag(patch.key.net)
                        ),
                        layer_scope.clone(),
                        &mut errors,
                    );
                }
            }
        }
    }

    // copper against other artwork, each layer individually
    for (&layer, layer_info) in ctx.board.layers.iter() {
        if !layer_info.copper {
            continue;
        }
        let others: Vec<usize> = (0..patches.len())
            .filter(|&i| {
                is_other_artwork(patches[i].key.patch_type) && patches[i].key.layer.contains(layer)
            })
            .collect();
        if others.is_empty() {
            continue;
        }
        let mut expanded_cache: HashMap<(usize, u64), MultiPolygon<f64>> = HashMap::new();
        for &i in &copper {
            if !patches[i].key.layer.contains(layer) {
                continue;
            }
            if r.check_cancelled(cancel) {
                return r;
            }
            let patch = &patches[i];
            for &j in &others {
                let other = &patches[j];
                let resolved = ctx.rules.resolve_clearance_other(
                    (patch.key.patch_type, patch.key.net),
                    other.key.patch_type,
                    &[layer],
                );
                if !resolved.matched {
                    unmatched += 1;
                }
                let expanded = expanded_cache
                    .entry((i, resolved.distance))
                    .or_insert_with(|| geometry::offset(&patch.poly, resolved.distance as i64));
                let isect = geometry::intersection(expanded, &other.poly);
                if !isect.0.is_empty() {
                    region_errors(
                        &isect,
                        &format!(
                            "{}{} near {} on layer {}",
                            patch.key.patch_type.name(),
                            ctx.board.net_name_tag(patch.key.net),
                            other.key.patch_type.name(),
                            ctx.board.layer_name(layer)
                        ),
                        vec![layer],
                        &mut errors,
                    );
                }
            }
        }
    }

    // copper against the board edge: deflate the outline by the
    // clearance and anything left outside of it is a violation
    {
        let outline: Vec<&crate::drc::pairs::PatchInfo<'_>> = patches
            .iter()
            .filter(|p| p.key.patch_type == PatchType::BoardEdge)
            .collect();
        if let Some(outline) = outline.first() {
            let outline = geometry::union_all(&outline.poly);
            let mut deflated_cache: HashMap<u64, MultiPolygon<f64>> = HashMap::new();
            let n = copper.len();
            for (done, &i) in copper.iter().enumerate() {
                if r.check_cancelled(cancel) {
                    return r;
                }
                status_cb(&format!("Checking board edge clearance {}/{}", done + 1, n));
                let patch = &patches[i];
                let layer_scope = ctx.board.copper_layers_in(&patch.key.layer);
                let resolved = ctx.rules.resolve_clearance_other(
                    (patch.key.patch_type, patch.key.net),
                    PatchType::BoardEdge,
                    &layer_scope,
                );
                if !resolved.matched {
                    unmatched += 1;
                }
                let deflated = deflated_cache
                    .entry(resolved.distance)
                    .or_insert_with(|| geometry::offset(&outline, -(resolved.distance as i64)));
                let remainder = geometry::difference(&patch.poly, deflated);
                if !remainder.0.is_empty() {
                    region_errors(
                        &remainder,
                        &format!(
                            "{}{} near Board edge",
                            patch.key.patch_type.name(),
                            ctx.board.net_name_tag(patch.key.net)
                        ),
                        layer_scope.clone(),
                        &mut errors,
                    );
                }
            }
        }
    }

    if unmatched > 0 {
        errors.push(CheckError::new(
            CheckLevel::Warn,
            format!(
                "No copper-other clearance rule matched {unmatched} combination(s); a clearance of 0 was used"
            ),
        ));
    }

    r.errors = errors;
    r.update();
    info!(
        "copper-other check: {} copper patches, {} errors in {:?}",
        copper.len(),
        r.errors.len(),
        start.elapsed()
    );
    r
}
