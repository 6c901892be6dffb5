//! Board metadata consumed by the checks
//!
//! The checker never reaches into ambient application state; every check
//! receives an explicit `&Board` carrying the net table, layer table,
//! package/pad placement data and net ties. All of it is read-only input
//! supplied by the surrounding application.

use indexmap::IndexMap;
use serde::Serialize;

use crate::geometry::Point;

/// Copper layer numbering: top is 0, inner layers are negative, bottom
/// is -100. Non-copper layers live outside that span.
pub mod layers {
    pub const TOP_COPPER: i32 = 0;
    pub const BOTTOM_COPPER: i32 = -100;
    pub const OUTLINE: i32 = 100;
}

/// Identifier of a net in the board's net table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NetId(pub u32);

#[derive(Debug, Clone)]
pub struct Net {
    pub name: String,
}

/// A board layer as the checker sees it
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub copper: bool,
}

/// An inclusive span of layers, `bottom <= top`.
///
/// Single-layer patches use a degenerate range; plated holes span every
/// copper layer they connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LayerRange {
    bottom: i32,
    top: i32,
}

impl LayerRange {
    pub fn new(a: i32, b: i32) -> Self {
        Self {
            bottom: a.min(b),
            top: a.max(b),
        }
    }

    pub fn single(layer: i32) -> Self {
        Self {
            bottom: layer,
            top: layer,
        }
    }

    pub fn top(&self) -> i32 {
        self.top
    }

    pub fn bottom(&self) -> i32 {
        self.bottom
    }

    pub fn is_multilayer(&self) -> bool {
        self.bottom != self.top
    }

    pub fn contains(&self, layer: i32) -> bool {
        self.bottom <= layer && layer <= self.top
    }

    pub fn overlaps(&self, other: &LayerRange) -> bool {
        self.top >= other.bottom && other.top >= self.bottom
    }

    pub fn intersection(&self, other: &LayerRange) -> Option<LayerRange> {
        if !self.overlaps(other) {
            return None;
        }
        Some(LayerRange {
            bottom: self.bottom.max(other.bottom),
            top: self.top.min(other.top),
        })
    }
}

/// Which copper layers a padstack reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadstackKind {
    Top,
    Bottom,
    Through,
}

/// A pad with its board-transformed nominal position
#[derive(Debug, Clone)]
pub struct Pad {
    pub name: String,
    pub net: Option<NetId>,
    pub position: Point,
    pub stack: PadstackKind,
}

#[derive(Debug, Clone)]
pub struct Package {
    pub refdes: String,
    pub pads: Vec<Pad>,
}

/// A deliberate, rule-sanctioned short between two nets
#[derive(Debug, Clone, Copy)]
pub struct NetTie {
    pub net_primary: NetId,
    pub net_secondary: NetId,
}

/// Read-only board metadata: net table, layer table, packages, net ties
#[derive(Debug, Default)]
pub struct Board {
    pub nets: IndexMap<NetId, Net>,
    pub layers: IndexMap<i32, Layer>,
    pub packages: Vec<Package>,
    pub net_ties: Vec<NetTie>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Board with top and bottom copper plus an outline layer
    pub fn two_layer() -> Self {
        let mut board = Self::new();
        board.add_layer(layers::TOP_COPPER, "Top", true);
        board.add_layer(layers::BOTTOM_COPPER, "Bottom", true);
        board.add_layer(layers::OUTLINE, "Outline", false);
        board
    }

    pub fn add_layer(&mut self, id: i32, name: &str, copper: bool) {
        self.layers.insert(
            id,
            Layer {
                name: name.to_string(),
                copper,
            },
        );
    }

    /// Register a net and return its id
    pub fn add_net(&mut self, name: &str) -> NetId {
        let id = NetId(self.nets.len() as u32);
        self.nets.insert(
            id,
            Net {
                name: name.to_string(),
            },
        );
        id
    }

    pub fn net_name(&self, net: Option<NetId>) -> &str {
        net.and_then(|id| self.nets.get(&id))
            .map(|n| n.name.as_str())
            .unwrap_or("")
    }

    /// Net name in parentheses for error comments, empty for no net
    pub fn net_name_tag(&self, net: Option<NetId>) -> String {
        let name = self.net_name(net);
        if name.is_empty() {
            String::new()
        } else {
            format!(" ({name})")
        }
    }

    pub fn layer_name(&self, layer: i32) -> String {
        self.layers
            .get(&layer)
            .map(|l| l.name.clone())
            .unwrap_or_else(|| layer.to_string())
    }

    /// Display name for a layer range in error comments
    pub fn range_name(&self, range: &LayerRange) -> String {
        if range.is_multilayer() {
            format!(
                "{}..{}",
                self.layer_name(range.top()),
                self.layer_name(range.bottom())
            )
        } else {
            self.layer_name(range.top())
        }
    }

    pub fn is_copper(&self, layer: i32) -> bool {
        self.layers.get(&layer).map_or(false, |l| l.copper)
    }

    /// All copper layers inside a range, in table order
    pub fn copper_layers_in(&self, range: &LayerRange) -> Vec<i32> {
        self.layers
            .iter()
            .filter(|(id, l)| l.copper && range.contains(**id))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn has_copper_in(&self, range: &LayerRange) -> bool {
        self.layers
            .iter()
            .any(|(id, l)| l.copper && range.contains(*id))
    }

    /// True if the two nets are the declared partners of some net tie
    pub fn is_tie_pair(&self, a: Option<NetId>, b: Option<NetId>) -> bool {
        let (Some(a), Some(b)) = (a, b) else {
            return false;
        };
        self.net_ties.iter().any(|tie| {
            (tie.net_primary == a && tie.net_secondary == b)
                || (tie.net_primary == b && tie.net_secondary == a)
        })
    }
}
