//! Clearance rules and rule resolution
//!
//! Rules are supplied by the surrounding application as ordered lists;
//! the checker only reads them. Resolution walks rules in order and the
//! first enabled rule whose predicates match wins for a given net pair
//! and layer. Distances are u64 nanometers.

use std::collections::HashMap;

use crate::board::NetId;
use crate::patches::PatchType;

/// Net predicate of a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleMatch {
    All,
    Net(NetId),
}

impl RuleMatch {
    pub fn matches(&self, net: Option<NetId>) -> bool {
        match self {
            RuleMatch::All => true,
            RuleMatch::Net(id) => net == Some(*id),
        }
    }
}

/// Layer predicate of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerScope {
    All,
    Layer(i32),
}

impl LayerScope {
    pub fn matches(&self, layer: i32) -> bool {
        match self {
            LayerScope::All => true,
            LayerScope::Layer(l) => *l == layer,
        }
    }
}

/// Minimum distance per (type, type) pair, with a fallback for pairs
/// that were never set explicitly. Lookups are symmetric.
#[derive(Debug, Clone)]
pub struct ClearanceMatrix {
    default: u64,
    entries: HashMap<(PatchType, PatchType), u64>,
}

impl ClearanceMatrix {
    pub fn new(default: u64) -> Self {
        Self {
            default,
            entries: HashMap::new(),
        }
    }

    fn key(a: PatchType, b: PatchType) -> (PatchType, PatchType) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn set(&mut self, a: PatchType, b: PatchType, distance: u64) {
        self.entries.insert(Self::key(a, b), distance);
    }

    pub fn get(&self, a: PatchType, b: PatchType) -> u64 {
        self.entries
            .get(&Self::key(a, b))
            .copied()
            .unwrap_or(self.default)
    }

    fn max_distance(&self) -> u64 {
        self.entries
            .values()
            .copied()
            .fold(self.default, u64::max)
    }
}

/// Copper-to-copper clearance rule
#[derive(Debug, Clone)]
pub struct ClearanceRule {
    pub enabled: bool,
    pub order: usize,
    pub match_a: RuleMatch,
    pub match_b: RuleMatch,
    pub layers: LayerScope,
    pub matrix: ClearanceMatrix,
}

impl ClearanceRule {
    pub fn new(order: usize, default_clearance: u64) -> Self {
        Self {
            enabled: true,
            order,
            match_a: RuleMatch::All,
            match_b: RuleMatch::All,
            layers: LayerScope::All,
            matrix: ClearanceMatrix::new(default_clearance),
        }
    }

    /// Net matching is symmetric: the two predicates may hit the pair
    /// in either order.
    fn matches(&self, net_a: Option<NetId>, net_b: Option<NetId>, layer: i32) -> bool {
        self.enabled
            && self.layers.matches(layer)
            && ((self.match_a.matches(net_a) && self.match_b.matches(net_b))
                || (self.match_a.matches(net_b) && self.match_b.matches(net_a)))
    }
}

/// Clearance of copper against the non-copper categories (NPTH holes,
/// silkscreen/other artwork, the board edge)
#[derive(Debug, Clone)]
pub struct ClearanceOtherRule {
    pub enabled: bool,
    pub order: usize,
    pub match_net: RuleMatch,
    pub layers: LayerScope,
    pub matrix: ClearanceMatrix,
}

impl ClearanceOtherRule {
    pub fn new(order: usize, default_clearance: u64) -> Self {
        Self {
            enabled: true,
            order,
            match_net: RuleMatch::All,
            layers: LayerScope::All,
            matrix: ClearanceMatrix::new(default_clearance),
        }
    }

    fn matches(&self, net: Option<NetId>, layer: i32) -> bool {
        self.enabled && self.layers.matches(layer) && self.match_net.matches(net)
    }
}

/// Component predicate of a shorted-pads rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentMatch {
    All,
    Refdes(String),
}

impl ComponentMatch {
    pub fn matches(&self, refdes: &str) -> bool {
        match self {
            ComponentMatch::All => true,
            ComponentMatch::Refdes(r) => r == refdes,
        }
    }
}

/// Declares that same-net pads of a matching package are deliberately
/// shorted by copper and count as connected without a through-hole.
#[derive(Debug, Clone)]
pub struct ShortedPadsRule {
    pub enabled: bool,
    pub order: usize,
    pub match_component: ComponentMatch,
    pub match_net: RuleMatch,
}

impl ShortedPadsRule {
    pub fn new(order: usize) -> Self {
        Self {
            enabled: true,
            order,
            match_component: ComponentMatch::All,
            match_net: RuleMatch::All,
        }
    }
}

/// Result of a clearance resolution. `matched` is false when some layer
/// in the scope had no applicable rule and the zero default was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub distance: u64,
    pub matched: bool,
}

/// The complete ordered rule set consulted by the checks
#[derive(Debug, Default)]
pub struct RuleSet {
    clearance_copper: Vec<ClearanceRule>,
    clearance_other: Vec<ClearanceOtherRule>,
    shorted_pads: Vec<ShortedPadsRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_clearance_copper(&mut self, rule: ClearanceRule) {
        self.clearance_copper.push(rule);
        self.clearance_copper.sort_by_key(|r| r.order);
    }

    pub fn add_clearance_other(&mut self, rule: ClearanceOtherRule) {
        self.clearance_other.push(rule);
        self.clearance_other.sort_by_key(|r| r.order);
    }

    pub fn add_shorted_pads(&mut self, rule: ShortedPadsRule) {
        self.shorted_pads.push(rule);
        self.shorted_pads.sort_by_key(|r| r.order);
    }

    /// First enabled copper clearance rule matching the pair on a layer
    pub fn clearance_copper_for(
        &self,
        net_a: Option<NetId>,
        net_b: Option<NetId>,
        layer: i32,
    ) -> Option<&ClearanceRule> {
        self.clearance_copper
            .iter()
            .find(|r| r.matches(net_a, net_b, layer))
    }

    /// First enabled copper-other rule matching a net on a layer
    pub fn clearance_other_for(
        &self,
        net: Option<NetId>,
        layer: i32,
    ) -> Option<&ClearanceOtherRule> {
        self.clearance_other.iter().find(|r| r.matches(net, layer))
    }

    /// Minimum required separation between two patches over the layers
    /// they share. Per layer the best-matching rule supplies the matrix
    /// distance; the result is the minimum across layers. A layer with
    /// no matching rule contributes zero.
    pub fn resolve_clearance(
        &self,
        a: (PatchType, Option<NetId>),
        b: (PatchType, Option<NetId>),
        layers: &[i32],
    ) -> Resolved {
        let mut distance = u64::MAX;
        let mut matched = !layers.is_empty();
        for &layer in layers {
            match self.clearance_copper_for(a.1, b.1, layer) {
                Some(rule) => distance = distance.min(rule.matrix.get(a.0, b.0)),
                None => {
                    distance = 0;
                    matched = false;
                }
            }
        }
        if distance == u64::MAX {
            distance = 0;
        }
        Resolved { distance, matched }
    }

    /// Like `resolve_clearance` but against a non-copper category
    /// (NPTH hole, other artwork, board edge)
    pub fn resolve_clearance_other(
        &self,
        copper: (PatchType, Option<NetId>),
        other_type: PatchType,
        layers: &[i32],
    ) -> Resolved {
        let mut distance = u64::MAX;
        let mut matched = !layers.is_empty();
        for &layer in layers {
            match self.clearance_other_for(copper.1, layer) {
                Some(rule) => distance = distance.min(rule.matrix.get(copper.0, other_type)),
                None => {
                    distance = 0;
                    matched = false;
                }
            }
        }
        if distance == u64::MAX {
            distance = 0;
        }
        Resolved { distance, matched }
    }

    /// Largest distance any enabled rule can demand, used as the
    /// spatial-query margin when gathering candidate pairs
    pub fn max_clearance(&self) -> u64 {
        let copper = self
            .clearance_copper
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.matrix.max_distance());
        let other = self
            .clearance_other
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.matrix.max_distance());
        copper.chain(other).max().unwrap_or(0)
    }

    /// True if some enabled shorted-pads rule covers this package/net
    pub fn shorted_pads_match(&self, refdes: &str, net: Option<NetId>) -> bool {
        self.shorted_pads
            .iter()
            .any(|r| r.enabled && r.match_component.matches(refdes) && r.match_net.matches(net))
    }

    pub fn has_shorted_pads_rules(&self) -> bool {
        self.shorted_pads.iter().any(|r| r.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_nets() -> (NetId, NetId) {
        (NetId(0), NetId(1))
    }

    #[test]
    fn test_resolution_is_symmetric() {
        let (gnd, vcc) = two_nets();
        let mut rules = RuleSet::new();
        let mut rule = ClearanceRule::new(0, 150_000);
        rule.match_a = RuleMatch::Net(gnd);
        rule.match_b = RuleMatch::All;
        rule.matrix.set(PatchType::Track, PatchType::Plane, 300_000);
        rules.add_clearance_copper(rule);

        let layers = [0, -100];
        let ab = rules.resolve_clearance(
            (PatchType::Track, Some(gnd)),
            (PatchType::Plane, Some(vcc)),
            &layers,
        );
        let ba = rules.resolve_clearance(
            (PatchType::Plane, Some(vcc)),
            (PatchType::Track, Some(gnd)),
            &layers,
        );
        assert_eq!(ab, ba);
        assert_eq!(ab.distance, 300_000);
        assert!(ab.matched);
    }

    #[test]
    fn test_first_enabled_match_wins() {
        let (gnd, vcc) = two_nets();
        let mut rules = RuleSet::new();
        let mut specific = ClearanceRule::new(0, 500_000);
        specific.match_a = RuleMatch::Net(gnd);
        rules.add_clearance_copper(specific);
        rules.add_clearance_copper(ClearanceRule::new(1, 150_000));

        let hit = rules.resolve_clearance(
            (PatchType::Track, Some(gnd)),
            (PatchType::Track, Some(vcc)),
            &[0],
        );
        assert_eq!(hit.distance, 500_000);

        let fallthrough = rules.resolve_clearance(
            (PatchType::Track, Some(vcc)),
            (PatchType::Track, Some(NetId(7))),
            &[0],
        );
        assert_eq!(fallthrough.distance, 150_000);
    }

    #[test]
    fn test_disabled_rule_is_skipped() {
        let mut rules = RuleSet::new();
        let mut rule = ClearanceRule::new(0, 500_000);
        rule.enabled = false;
        rules.add_clearance_copper(rule);
        rules.add_clearance_copper(ClearanceRule::new(1, 150_000));
        let r = rules.resolve_clearance(
            (PatchType::Track, Some(NetId(0))),
            (PatchType::Track, Some(NetId(1))),
            &[0],
        );
        assert_eq!(r.distance, 150_000);
    }

    #[test]
    fn test_minimum_across_layer_scope() {
        let mut rules = RuleSet::new();
        let mut top_only = ClearanceRule::new(0, 400_000);
        top_only.layers = LayerScope::Layer(0);
        rules.add_clearance_copper(top_only);
        let mut bottom_only = ClearanceRule::new(1, 200_000);
        bottom_only.layers = LayerScope::Layer(-100);
        rules.add_clearance_copper(bottom_only);

        let r = rules.resolve_clearance(
            (PatchType::Via, Some(NetId(0))),
            (PatchType::Via, Some(NetId(1))),
            &[0, -100],
        );
        assert_eq!(r.distance, 200_000);
        assert!(r.matched);
    }

    #[test]
    fn test_no_rule_resolves_to_observable_zero() {
        let rules = RuleSet::new();
        let r = rules.resolve_clearance(
            (PatchType::Track, Some(NetId(0))),
            (PatchType::Track, Some(NetId(1))),
            &[0],
        );
        assert_eq!(r.distance, 0);
        assert!(!r.matched);
    }

    #[test]
    fn test_matrix_lookup_is_symmetric() {
        let mut m = ClearanceMatrix::new(100);
        m.set(PatchType::Pad, PatchType::Track, 250);
        assert_eq!(m.get(PatchType::Track, PatchType::Pad), 250);
        assert_eq!(m.get(PatchType::Pad, PatchType::Track), 250);
        assert_eq!(m.get(PatchType::Pad, PatchType::Via), 100);
    }

    #[test]
    fn test_max_clearance() {
        let mut rules = RuleSet::new();
        let mut rule = ClearanceRule::new(0, 150_000);
        rule.matrix.set(PatchType::Plane, PatchType::Plane, 700_000);
        rules.add_clearance_copper(rule);
        rules.add_clearance_other(ClearanceOtherRule::new(0, 250_000));
        assert_eq!(rules.max_clearance(), 700_000);
    }
}
