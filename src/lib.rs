//! Design rule checking for printed circuit boards
//!
//! Given a board's rendered copper geometry (the patch store), this crate
//! verifies that electrically distinct regions keep their required
//! clearance and that each net's copper actually hangs together. Checks
//! scale to tens of thousands of patches through bounding-box pruning and
//! parallel geometry phases, and can be cancelled at any time by the
//! caller.
//!
//! The surrounding application supplies three read-only inputs: the
//! patch store, the clearance rule set, and the board metadata (nets,
//! layers, packages, net ties). Results come back as severity-leveled
//! error lists with locations and visualization polygons, ready for
//! display without further geometry queries.

pub mod board;
pub mod drc;
pub mod geometry;
pub mod patches;
pub mod rules;

pub use board::{Board, Layer, LayerRange, Net, NetId, NetTie, Pad, PadstackKind, Package};
pub use drc::{
    run_all, run_check, CheckContext, CheckError, CheckId, CheckLevel, CheckResult, StatusCb,
};
pub use patches::{PatchKey, PatchStore, PatchType};
pub use rules::{
    ClearanceMatrix, ClearanceOtherRule, ClearanceRule, ComponentMatch, LayerScope, Resolved,
    RuleMatch, RuleSet, ShortedPadsRule,
};
