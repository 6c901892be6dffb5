//! Check dispatch and top-level isolation
//!
//! The geometry engine is allowed to panic on malformed input; those
//! panics are not caught inside the hot loops. `run_all` catches them
//! once per check so a degenerate polygon fails that one check instead
//! of taking down the whole run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::AtomicBool;

use log::warn;
use serde::Serialize;

use super::result::{CheckError, CheckLevel, CheckResult};
use super::{
    check_board_connectivity, check_clearance_copper, check_clearance_copper_other, CheckContext,
    StatusCb,
};

/// The checks this engine provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckId {
    ClearanceCopper,
    ClearanceCopperOther,
    BoardConnectivity,
}

impl CheckId {
    pub const ALL: [CheckId; 3] = [
        CheckId::ClearanceCopper,
        CheckId::ClearanceCopperOther,
        CheckId::BoardConnectivity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CheckId::ClearanceCopper => "Clearance copper",
            CheckId::ClearanceCopperOther => "Clearance copper - non copper",
            CheckId::BoardConnectivity => "Board connectivity",
        }
    }
}

/// Run a single check
pub fn run_check(
    id: CheckId,
    ctx: &CheckContext<'_>,
    status_cb: StatusCb<'_>,
    cancel: &AtomicBool,
) -> CheckResult {
    match id {
        CheckId::ClearanceCopper => check_clearance_copper(ctx, status_cb, cancel),
        CheckId::ClearanceCopperOther => check_clearance_copper_other(ctx, status_cb, cancel),
        CheckId::BoardConnectivity => check_board_connectivity(ctx, status_cb, cancel),
    }
}

/// Run every check, isolating each one's panics. A check that panics
/// produces a FAIL result carrying the panic text; the remaining checks
/// still run and their results are unaffected.
pub fn run_all(
    ctx: &CheckContext<'_>,
    status_cb: StatusCb<'_>,
    cancel: &AtomicBool,
) -> Vec<(CheckId, CheckResult)> {
    CheckId::ALL
        .iter()
        .map(|&id| {
            let outcome = catch_unwind(AssertUnwindSafe(|| run_check(id, ctx, status_cb, cancel)));
            let result = match outcome {
                Ok(result) => result,
                Err(payload) => {
                    let text = panic_text(payload.as_ref());
                    warn!("check '{}' did not complete: {}", id.name(), text);
                    let mut r = CheckResult::new();
                    r.errors.push(CheckError::new(
                        CheckLevel::Fail,
                        format!("Check did not complete: {text}"),
                    ));
                    r.update();
                    r
                }
            };
            (id, result)
        })
        .collect()
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
