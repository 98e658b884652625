//! Optimizer and objective traits.

use nalgebra::DVector;
use crate::error::Result;

/// A differentiable scalar function of a parameter vector.
pub trait Objective {
    /// Value and gradient at `x`.
    fn evaluate(&mut self, x: &DVector<f64>) -> Result<(f64, DVector<f64>)>;
}

/// Why an optimization run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationStatus {
    /// Tolerance met, gradient vanished or no improving step was found.
    Converged,
    /// The iteration budget ran out first.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best parameters found.
    pub parameters: DVector<f64>,
    /// Objective value at `parameters`.
    pub value: f64,
    pub iterations: usize,
    pub status: OptimizationStatus,
    /// Objective value after each accepted step, starting point first.
    pub history: Vec<f64>,
}

/// Progress of one accepted iteration.
#[derive(Debug, Clone, Copy)]
pub struct IterationInfo {
    pub iteration: usize,
    pub value: f64,
    pub step_length: f64,
    pub gradient_norm: f64,
}

/// Minimizer of an [`Objective`].
pub trait Optimizer {
    /// Minimize from `x0` with at most `max_iterations` accepted steps.
    ///
    /// Non-convergence is not an error: the best point is returned with
    /// [`OptimizationStatus::Exhausted`]. Only a failure to evaluate the
    /// starting point is returned as an error.
    fn minimize(
        &self,
        objective: &mut dyn Objective,
        x0: DVector<f64>,
        max_iterations: usize,
        callback: &mut dyn FnMut(&IterationInfo),
    ) -> Result<OptimizationResult>;
}
