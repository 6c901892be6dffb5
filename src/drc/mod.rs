//! Design rule checks over the patch store
//!
//! Clearance violation detection and net connectivity analysis. All
//! checks consume read-only inputs (board metadata, patch store, rule
//! set) through an explicit [`CheckContext`], poll a shared cancellation
//! flag, and report progress through a caller-supplied callback. Parallel
//! phases run on the rayon pool, which is sized to the available
//! hardware concurrency.
//!
//! # Submodules
//! - `result` - Check results, errors and severity levels
//! - `pairs` - Candidate pair generation with bounding-box pruning
//! - `clearance` - Parallel expand-and-intersect copper clearance engine
//! - `clearance_other` - Copper against NPTH holes, artwork, board edge
//! - `connectivity` - Fragment builder, hole links, cluster walker
//! - `runner` - Check dispatch and per-check panic isolation

mod clearance;
mod clearance_other;
mod connectivity;
mod pairs;
mod result;
mod runner;

pub use clearance::check_clearance_copper;
pub use clearance_other::check_clearance_copper_other;
pub use connectivity::check_board_connectivity;
pub use result::{CheckError, CheckLevel, CheckResult};
pub use runner::{run_all, run_check, CheckId};

use crate::board::Board;
use crate::patches::PatchStore;
use crate::rules::RuleSet;

/// Progress callback. Called concurrently from worker threads, so it
/// must be safe to invoke from several threads at once.
pub type StatusCb<'a> = &'a (dyn Fn(&str) + Sync);

/// Everything a check reads: board metadata, the patch store and the
/// rule set, all immutable for the duration of the run
pub struct CheckContext<'a> {
    pub board: &'a Board,
    pub store: &'a PatchStore,
    pub rules: &'a RuleSet,
}
