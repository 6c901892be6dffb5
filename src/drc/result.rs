//! Check results, errors and severity levels

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::geometry::{Paths, Point};

/// Severity of a check or of a single finding. Ordered so the aggregate
/// level of a result is the maximum over its errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum CheckLevel {
    NotRun,
    Pass,
    Warn,
    Fail,
}

impl CheckLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckLevel::NotRun => "not run",
            CheckLevel::Pass => "pass",
            CheckLevel::Warn => "warning",
            CheckLevel::Fail => "fail",
        }
    }
}

/// One finding of a check, with everything the UI needs to render it
#[derive(Debug, Clone, Serialize)]
pub struct CheckError {
    pub level: CheckLevel,
    pub comment: String,
    /// Representative point of the finding, if it has one
    pub location: Option<Point>,
    /// Polygon rings for visualization overlay
    pub error_polygons: Paths,
    /// Layers the finding applies to
    pub layers: Vec<i32>,
}

impl CheckError {
    pub fn new(level: CheckLevel, comment: impl Into<String>) -> Self {
        Self {
            level,
            comment: comment.into(),
            location: None,
            error_polygons: Paths::new(),
            layers: Vec::new(),
        }
    }
}

/// Aggregate outcome of one check: worst-case level plus the ordered
/// list of findings
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub level: CheckLevel,
    pub errors: Vec<CheckError>,
}

impl Default for CheckResult {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckResult {
    pub fn new() -> Self {
        Self {
            level: CheckLevel::NotRun,
            errors: Vec::new(),
        }
    }

    /// Recompute the aggregate level from the error list. A result with
    /// no errors passes.
    pub fn update(&mut self) {
        self.level = self
            .errors
            .iter()
            .map(|e| e.level)
            .fold(CheckLevel::Pass, CheckLevel::max);
    }

    /// Poll the cancellation flag. Once set, any partial findings are
    /// discarded and the result is marked not-run; cancellation is not
    /// an error.
    pub fn check_cancelled(&mut self, cancel: &AtomicBool) -> bool {
        if cancel.load(Ordering::Relaxed) {
            self.errors.clear();
            self.level = CheckLevel::NotRun;
            return true;
        }
        false
    }
}
