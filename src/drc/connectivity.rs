//! Net connectivity analysis
//!
//! Unions every net's copper per layer into fragments, links fragments
//! through plated holes and shorted-pads rules, and flood-fills the
//! resulting graph. A net whose fragments fall into more than one
//! cluster is electrically broken.
//!
//! Fragments and holes live in per-net arenas and reference each other
//! by index; the cluster walk uses an explicit stack, so arbitrarily
//! large fragment graphs cannot exhaust the call stack.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use geo::MultiPolygon;
use log::info;
use rayon::prelude::*;

use crate::board::{layers, LayerRange, NetId, PadstackKind};
use crate::drc::result::{CheckError, CheckLevel, CheckResult};
use crate::drc::{CheckContext, StatusCb};
use crate::geometry::{
    self, point_in_ring, Bbox, FillRule, Path, Paths, Point, RingSide,
};
use crate::patches::PatchType;

/// A maximal filled copper region of one net on one layer
struct Fragment {
    layer: i32,
    contour: Path,
    holes: Vec<Path>,
    poly: MultiPolygon<f64>,
    /// Tight box of the outer contour
    bbox: Bbox,
    /// 0 = not yet visited by the cluster walk
    cluster: usize,
    connected_holes: Vec<usize>,
    /// Direct links from shorted-pads rules
    linked_fragments: BTreeSet<usize>,
}

impl Fragment {
    /// Point-in-region test: on or inside the contour and not strictly
    /// inside any hole
    fn contains(&self, p: Point) -> bool {
        if point_in_ring(p, &self.contour) == RingSide::Outside {
            return false;
        }
        !self
            .holes
            .iter()
            .any(|h| point_in_ring(p, h) == RingSide::Inside)
    }
}

/// A plated through-hole of one net
struct HoleInfo {
    poly: MultiPolygon<f64>,
    bbox: Bbox,
    span: LayerRange,
    connected_fragments: Vec<usize>,
}

/// All connectivity state of one net
struct NetInfo {
    net: NetId,
    layer_paths: BTreeMap<i32, Paths>,
    fragments: Vec<Fragment>,
    holes: Vec<HoleInfo>,
}

impl NetInfo {
    fn new(net: NetId) -> Self {
        Self {
            net,
            layer_paths: BTreeMap::new(),
            fragments: Vec::new(),
            holes: Vec::new(),
        }
    }

    /// Union each layer's rings and decompose the result into fragments.
    /// Islands inside holes come back as separate polygons and therefore
    /// as independent fragments.
    fn create_fragments(&mut self) {
        for (&layer, paths) in &self.layer_paths {
            let merged = geometry::union_all(&geometry::assemble(paths, FillRule::NonZero));
            let regions = geometry::to_regions(&merged);
            for (poly, region) in merged.0.into_iter().zip(regions) {
                let bbox = match Bbox::from_path(&region.contour) {
                    Some(bb) => bb,
                    None => continue,
                };
                self.fragments.push(Fragment {
                    layer,
                    contour: region.contour,
                    holes: region.holes,
                    poly: MultiPolygon::new(vec![poly]),
                    bbox,
                    cluster: 0,
                    connected_holes: Vec::new(),
                    linked_fragments: BTreeSet::new(),
                });
            }
        }
    }
}

/// Flood-fill cluster ids over the fragment/hole graph of one net.
/// Returns the number of clusters.
fn walk_clusters(net: &mut NetInfo) -> usize {
    let mut clusters = 0usize;
    loop {
        let Some(start) = net.fragments.iter().position(|f| f.cluster == 0) else {
            break;
        };
        clusters += 1;
        let mut stack = vec![start];
        while let Some(fi) = stack.pop() {
            if net.fragments[fi].cluster != 0 {
                continue;
            }
            net.fragments[fi].cluster = clusters;
            for &hi in &net.fragments[fi].connected_holes {
                for &other in &net.holes[hi].connected_fragments {
                    if net.fragments[other].cluster == 0 {
                        stack.push(other);
                    }
                }
            }
            for &other in &net.fragments[fi].linked_fragments {
                if net.fragments[other].cluster == 0 {
                    stack.push(other);
                }
            }
        }
    }
    clusters
}

fn pad_layers(stack: PadstackKind) -> &'static [i32] {
    match stack {
        PadstackKind::Top => &[layers::TOP_COPPER],
        PadstackKind::Bottom => &[layers::BOTTOM_COPPER],
        PadstackKind::Through => &[layers::TOP_COPPER, layers::BOTTOM_COPPER],
    }
}

/// Run the net connectivity check
pub fn check_board_connectivity(
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
    let mut net_index: HashMap<NetId, usize> = HashMap::new();
    let mut nets: Vec<NetInfo> = Vec::new();
    for (key, paths) in ctx.store.iter() {
        if matches!(
            key.patch_type,
            PatchType::Other | PatchType::Text | PatchType::BoardEdge
        ) {
            continue;
        }
        let Some(net) = key.net else {
            continue;
        };
        let idx = *net_index.entry(net).or_insert_with(|| {
            nets.push(NetInfo::new(net));
            nets.len() - 1
        });
        let info = &mut nets[idx];
        if !key.layer.is_multilayer() && ctx.board.is_copper(key.layer.top()) {
            info.layer_paths
                .entry(key.layer.top())
                .or_default()
                .extend(paths.iter().cloned());
        } else if key.patch_type == PatchType::HolePth && key.layer.is_multilayer() {
            for ring in paths {
                let Some(bbox) = Bbox::from_path(ring) else {
                    continue;
                };
                info.holes.push(HoleInfo {
                    poly: geometry::assemble(
                        &vec![ring.clone()],
                        PatchType::HolePth.fill_rule(),
                    ),
                    bbox,
                    span: key.layer,
                    connected_fragments: Vec::new(),
                });
            }
        }
    }
    if r.check_cancelled(cancel) {
        return r;
    }

    status_cb("Creating fragments");
    nets.par_iter_mut().for_each(|net| {
        if cancel.load(Ordering::Relaxed) {
            return;
        }
        net.create_fragments();
    });
    if r.check_cancelled(cancel) {
        return r;
    }

    // which fragments need an exact test against which plated holes
    let mut to_check: Vec<(usize, usize, usize)> = Vec::new();
    for (ni, net) in nets.iter().enumerate() {
        for (fi, frag) in net.fragments.iter().enumerate() {
            for (hi, hole) in net.holes.iter().enumerate() {
                if hole.span.contains(frag.layer) && frag.bbox.overlaps(&hole.bbox) {
                    to_check.push((ni, fi, hi));
                }
            }
        }
    }

    let n_items = to_check.len();
    let item_counter = AtomicUsize::new(0);
    let overlaps: Vec<bool> = to_check
        .par_iter()
        .map(|&(ni, fi, hi)| {
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            let done = item_counter.fetch_add(1, Ordering::Relaxed) + 1;
            status_cb(&format!("Checking PTH/fragment {done}/{n_items}"));
            let net = &nets[ni];
            !geometry::intersection(&net.holes[hi].poly, &net.fragments[fi].poly)
                .0
                .is_empty()
        })
        .collect();
    if r.check_cancelled(cancel) {
        return r;
    }

    for (&(ni, fi, hi), &connected) in to_check.iter().zip(&overlaps) {
        if connected {
            nets[ni].fragments[fi].connected_holes.push(hi);
            nets[ni].holes[hi].connected_fragments.push(fi);
        }
    }

    if ctx.rules.has_shorted_pads_rules() {
        status_cb("Processing shorted pads rules");
        for pkg in &ctx.board.packages {
            let pkg_nets: BTreeSet<NetId> = pkg.pads.iter().filter_map(|p| p.net).collect();
            for net in pkg_nets {
                if !ctx.rules.shorted_pads_match(&pkg.refdes, Some(net)) {
                    continue;
                }
                let Some(&ni) = net_index.get(&net) else {
                    continue;
                };
                let info = &mut nets[ni];
                let mut connected: Vec<usize> = Vec::new();
                for pad in pkg.pads.iter().filter(|p| p.net == Some(net)) {
                    for &layer in pad_layers(pad.stack) {
                        for (fi, frag) in info.fragments.iter().enumerate() {
                            if frag.layer == layer && frag.contains(pad.position) {
                                connected.push(fi);
                            }
                        }
                    }
                }
                if connected.len() > 1 {
                    let first = connected[0];
                    for &other in &connected[1..] {
                        if other != first {
                            info.fragments[first].linked_fragments.insert(other);
                            info.fragments[other].linked_fragments.insert(first);
                        }
                    }
                }
            }
        }
    }

    status_cb("Checking connectivity");
    for net in &mut nets {
        if r.check_cancelled(cancel) {
            return r;
        }
        let clusters = walk_clusters(net);
        debug_assert!(net.fragments.iter().all(|f| f.cluster != 0));
        if clusters > 1 {
            r.errors.push(CheckError::new(
                CheckLevel::Fail,
                format!(
                    "Net {} has {} unconnected groups",
                    ctx.board.net_name(Some(net.net)),
                    clusters
                ),
            ));
        }
    }

    r.update();
    info!(
        "connectivity check: {} nets, {} hole/fragment tests, {} errors in {:?}",
        nets.len(),
        n_items,
        r.errors.len(),
        start.elapsed()
    );
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x0: i64, y0: i64, x1: i64, y1: i64) -> Path {
        vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ]
    }

    fn fragment_on(layer: i32, contour: Path) -> Fragment {
        let bbox = Bbox::from_path(&contour).unwrap();
        let poly = geometry::assemble(&vec![contour.clone()], FillRule::NonZero);
        Fragment {
            layer,
            contour,
            holes: Vec::new(),
            poly,
            bbox,
            cluster: 0,
            connected_holes: Vec::new(),
            linked_fragments: BTreeSet::new(),
        }
    }

    #[test]
    fn test_walk_assigns_every_fragment_a_cluster() {
        let mut net = NetInfo::new(NetId(0));
        net.fragments.push(fragment_on(0, rect(0, 0, 10, 10)));
        net.fragments.push(fragment_on(0, rect(100, 0, 110, 10)));
        net.fragments.push(fragment_on(-100, rect(0, 0, 10, 10)));
        let clusters = walk_clusters(&mut net);
        assert_eq!(clusters, 3);
        assert!(net.fragments.iter().all(|f| f.cluster != 0));
    }

    #[test]
    fn test_walk_merges_via_hole_links() {
        let mut net = NetInfo::new(NetId(0));
        net.fragments.push(fragment_on(0, rect(0, 0, 10, 10)));
        net.fragments.push(fragment_on(-100, rect(0, 0, 10, 10)));
        net.holes.push(HoleInfo {
            poly: geometry::assemble(&vec![rect(2, 2, 8, 8)], FillRule::NonZero),
            bbox: Bbox::from_path(&rect(2, 2, 8, 8)).unwrap(),
            span: LayerRange::new(layers::TOP_COPPER, layers::BOTTOM_COPPER),
            connected_fragments: vec![0, 1],
        });
        net.fragments[0].connected_holes.push(0);
        net.fragments[1].connected_holes.push(0);
        assert_eq!(walk_clusters(&mut net), 1);
        assert_eq!(net.fragments[0].cluster, net.fragments[1].cluster);
    }

    #[test]
    fn test_walk_merges_via_direct_links() {
        let mut net = NetInfo::new(NetId(0));
        net.fragments.push(fragment_on(0, rect(0, 0, 10, 10)));
        net.fragments.push(fragment_on(0, rect(100, 0, 110, 10)));
        net.fragments[0].linked_fragments.insert(1);
        net.fragments[1].linked_fragments.insert(0);
        assert_eq!(walk_clusters(&mut net), 1);
    }

    #[test]
    fn test_fragment_contains_excludes_holes() {
        let mut frag = fragment_on(0, rect(0, 0, 100, 100));
        frag.holes.push(rect(40, 40, 60, 60));
        assert!(frag.contains(Point::new(10, 10)));
        assert!(!frag.contains(Point::new(50, 50)));
        assert!(!frag.contains(Point::new(200, 50)));
        // points on the contour itself count as connected
        assert!(frag.contains(Point::new(0, 50)));
    }

    #[test]
    fn test_fragments_decompose_islands_in_holes() {
        let mut net = NetInfo::new(NetId(0));
        let mut outer_with_hole = Paths::new();
        outer_with_hole.push(rect(0, 0, 100, 100));
        let mut hole = rect(20, 20, 80, 80);
        hole.reverse();
        outer_with_hole.push(hole);
        outer_with_hole.push(rect(40, 40, 60, 60)); // island inside the hole
        net.layer_paths.insert(0, outer_with_hole);
        net.create_fragments();
        assert_eq!(net.fragments.len(), 2);
        let with_hole = net.fragments.iter().find(|f| !f.holes.is_empty()).unwrap();
        assert_eq!(with_hole.holes.len(), 1);
    }
}
