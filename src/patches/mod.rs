//! The patch store: rendered copper geometry, keyed by what produced it
//!
//! A patch is the polygon footprint a board entity occupies on a layer
//! range, tagged with its electrical type and owning net. The store is
//! built once per check run by the patch-extraction collaborator and
//! consumed read-only here.

use indexmap::IndexMap;
use serde::Serialize;

use crate::board::{LayerRange, NetId};
use crate::geometry::{FillRule, Paths};

/// Electrical type of a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PatchType {
    Track,
    Pad,
    PadTh,
    Plane,
    Via,
    HolePth,
    HoleNpth,
    BoardEdge,
    NetTie,
    Other,
    Text,
}

impl PatchType {
    /// Display name used in error comments
    pub fn name(self) -> &'static str {
        match self {
            PatchType::Track => "Track",
            PatchType::Pad => "Pad",
            PatchType::PadTh => "Through-hole pad",
            PatchType::Plane => "Plane",
            PatchType::Via => "Via",
            PatchType::HolePth => "PTH hole",
            PatchType::HoleNpth => "NPTH hole",
            PatchType::BoardEdge => "Board edge",
            PatchType::NetTie => "Net tie",
            PatchType::Other => "Other",
            PatchType::Text => "Text",
        }
    }

    /// Fill rule implied by the patch type. Only the board outline is
    /// drawn with even-odd paths.
    pub fn fill_rule(self) -> FillRule {
        match self {
            PatchType::BoardEdge => FillRule::EvenOdd,
            _ => FillRule::NonZero,
        }
    }
}

/// Identifies one patch: electrical type, layer span, owning net
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PatchKey {
    pub patch_type: PatchType,
    pub layer: LayerRange,
    pub net: Option<NetId>,
}

/// Immutable mapping from patch keys to closed polygon rings.
///
/// Insertion order is preserved so check runs enumerate candidates
/// deterministically.
#[derive(Debug, Default)]
pub struct PatchStore {
    patches: IndexMap<PatchKey, Paths>,
}

impl PatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add rings under a key, extending any rings already stored there
    pub fn insert(&mut self, key: PatchKey, paths: Paths) {
        self.patches.entry(key).or_default().extend(paths);
    }

    pub fn get(&self, key: &PatchKey) -> Option<&Paths> {
        self.patches.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PatchKey, &Paths)> {
        self.patches.iter()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}
