//! Per-stage audit records returned with a registration result.

use serde::{Deserialize, Serialize};
use crate::config::StageKind;
use crate::optimizer::OptimizationStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelOutcome {
    Converged,
    Exhausted,
    /// Zero iteration budget, or no overlap at the level seed.
    Skipped,
}

impl From<OptimizationStatus> for LevelOutcome {
    fn from(status: OptimizationStatus) -> Self {
        match status {
            OptimizationStatus::Converged => LevelOutcome::Converged,
            OptimizationStatus::Exhausted => LevelOutcome::Exhausted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelReport {
    pub level: usize,
    pub iterations: usize,
    /// Mutual information at the level result, `None` when skipped.
    pub similarity: Option<f64>,
    pub outcome: LevelOutcome,
}

/// What one stage did.
///
/// Similarities are mutual information at the finest pyramid level (full
/// resolution when no iterative stage runs). `similarity_after` describes the
/// stage output, so it equals `similarity_before` for a reverted stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: StageKind,
    pub similarity_before: Option<f64>,
    pub similarity_after: Option<f64>,
    pub reverted: bool,
    /// Parameter values of the stage output.
    pub parameters: Vec<f64>,
    /// Empty for the closed-form center-of-mass stage.
    pub levels: Vec<LevelReport>,
}
