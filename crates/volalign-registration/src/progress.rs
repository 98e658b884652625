//! Progress events and observers for registration runs.
//!
//! The pipeline never logs directly: it emits [`RegistrationEvent`]s to an
//! injected [`RegistrationObserver`]. [`TracingObserver`] is the default and
//! forwards everything to `tracing`.

use std::sync::{Arc, Mutex};
use crate::config::StageKind;
use crate::optimizer::OptimizationStatus;

/// Something that happened during a registration run.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationEvent {
    StageStarted {
        stage: StageKind,
        parameters: Vec<f64>,
    },
    LevelStarted {
        stage: StageKind,
        level: usize,
        levels: usize,
        /// `[Z, Y, X]` shape of the fixed level.
        shape: [usize; 3],
        max_iterations: usize,
    },
    Iteration {
        stage: StageKind,
        level: usize,
        iteration: usize,
        /// Mutual information at the accepted point.
        similarity: f64,
        step_length: f64,
    },
    LevelFinished {
        stage: StageKind,
        level: usize,
        iterations: usize,
        similarity: f64,
        status: OptimizationStatus,
    },
    /// The level ran out of iterations before meeting the tolerance.
    ConvergenceWarning {
        stage: StageKind,
        level: usize,
        iterations: usize,
    },
    LevelSkipped {
        stage: StageKind,
        level: usize,
        reason: String,
    },
    /// The stage scored worse than its seed and was undone.
    StageReverted {
        stage: StageKind,
        similarity_before: Option<f64>,
        similarity_after: Option<f64>,
    },
    StageFinished {
        stage: StageKind,
        similarity: Option<f64>,
        parameters: Vec<f64>,
    },
}

/// Sink for registration events.
pub trait RegistrationObserver: Send + Sync {
    fn on_event(&self, event: &RegistrationEvent);
}

/// Observer that logs events through `tracing`.
///
/// Stage and level boundaries go to `info`, iterations to `debug`, and
/// warnings (exhausted budgets, skipped levels, reverted stages) to `warn`.
#[derive(Debug, Clone)]
pub struct TracingObserver {
    /// Log every n-th iteration.
    pub log_interval: usize,
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self { log_interval: 1 }
    }
}

impl TracingObserver {
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl RegistrationObserver for TracingObserver {
    fn on_event(&self, event: &RegistrationEvent) {
        match event {
            RegistrationEvent::StageStarted { stage, parameters } => {
                tracing::info!(%stage, ?parameters, "stage started");
            }
            RegistrationEvent::LevelStarted { stage, level, levels, shape, max_iterations } => {
                tracing::info!(
                    "{} level {}/{}: shape {:?}, up to {} iterations",
                    stage, level + 1, levels, shape, max_iterations
                );
            }
            RegistrationEvent::Iteration { stage, level, iteration, similarity, step_length } => {
                if iteration % self.log_interval == 0 {
                    tracing::debug!(
                        "{} level {} iter {} | MI: {:.6} | step: {:.3e}",
                        stage, level, iteration, similarity, step_length
                    );
                }
            }
            RegistrationEvent::LevelFinished { stage, level, iterations, similarity, status } => {
                tracing::info!(
                    "{} level {} finished after {} iterations ({:?}), MI {:.6}",
                    stage, level, iterations, status, similarity
                );
            }
            RegistrationEvent::ConvergenceWarning { stage, level, iterations } => {
                tracing::warn!(
                    "{} level {} did not converge within {} iterations",
                    stage, level, iterations
                );
            }
            RegistrationEvent::LevelSkipped { stage, level, reason } => {
                tracing::warn!("{} level {} skipped: {}", stage, level, reason);
            }
            RegistrationEvent::StageReverted { stage, similarity_before, similarity_after } => {
                tracing::warn!(
                    ?similarity_before,
                    ?similarity_after,
                    "{} stage scored worse than its seed, reverting",
                    stage
                );
            }
            RegistrationEvent::StageFinished { stage, similarity, parameters } => {
                tracing::info!(%stage, ?similarity, ?parameters, "stage finished");
            }
        }
    }
}

/// Observer that records every event, for callers auditing a run.
#[derive(Debug, Clone, Default)]
pub struct HistoryObserver {
    events: Arc<Mutex<Vec<RegistrationEvent>>>,
}

impl HistoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<RegistrationEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn clear(&self) {
        match self.events.lock() {
            Ok(mut events) => events.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl RegistrationObserver for HistoryObserver {
    fn on_event(&self, event: &RegistrationEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Observer that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl RegistrationObserver for NullObserver {
    fn on_event(&self, _event: &RegistrationEvent) {}
}
