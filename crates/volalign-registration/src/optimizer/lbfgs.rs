//! L-BFGS Optimizer Implementation
//!
//! Limited-memory BFGS with the standard two-loop recursion and a
//! backtracking Armijo line search. Works on host `f64` vectors; gradients
//! come from the [`Objective`].

use std::collections::VecDeque;
use burn::config::Config;
use nalgebra::DVector;
use crate::error;
use crate::validation::ConvergenceChecker;
use super::trait_::{IterationInfo, Objective, OptimizationResult, OptimizationStatus, Optimizer};

/// L-BFGS Configuration
#[derive(Config, Debug)]
pub struct LbfgsConfig {
    /// History size (number of correction pairs to keep)
    #[config(default = 10)]
    pub history_size: usize,
    /// Longest step tried by the line search
    #[config(default = 2.0)]
    pub max_step: f64,
    /// Relative improvement per iteration below which the run has converged
    #[config(default = 1e-6)]
    pub tolerance: f64,
    #[config(default = 1e-8)]
    pub gradient_tolerance: f64,
    /// Step halvings before the line search gives up
    #[config(default = 12)]
    pub max_line_search_steps: usize,
    /// Sufficient-decrease constant
    #[config(default = 1e-4)]
    pub armijo: f64,
}

impl LbfgsConfig {
    pub fn init(&self) -> Lbfgs {
        Lbfgs::new(self.clone())
    }
}

/// L-BFGS minimizer.
#[derive(Debug, Clone)]
pub struct Lbfgs {
    config: LbfgsConfig,
}

#[derive(Debug, Clone)]
struct Correction {
    /// x_{k+1} - x_k
    s: DVector<f64>,
    /// g_{k+1} - g_k
    y: DVector<f64>,
    /// 1 / (y^T s)
    rho: f64,
}

impl Lbfgs {
    pub fn new(config: LbfgsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LbfgsConfig {
        &self.config
    }

    /// Search direction `-H g` from the two-loop recursion, or the normalized
    /// steepest descent direction while the history is empty.
    fn direction(&self, gradient: &DVector<f64>, history: &VecDeque<Correction>) -> DVector<f64> {
        let Some(last) = history.back() else {
            return -gradient / gradient.norm();
        };

        let mut q = gradient.clone();
        let mut alphas = Vec::with_capacity(history.len());
        for c in history.iter().rev() {
            let alpha = c.rho * c.s.dot(&q);
            q.axpy(-alpha, &c.y, 1.0);
            alphas.push(alpha);
        }

        // Initial Hessian approximation gamma * I
        let gamma = last.s.dot(&last.y) / last.y.dot(&last.y);
        let mut r = q * gamma;

        for (c, alpha) in history.iter().zip(alphas.iter().rev()) {
            let beta = c.rho * c.y.dot(&r);
            r.axpy(alpha - beta, &c.s, 1.0);
        }
        -r
    }
}

/// State of one L-BFGS run, discarded once the result is extracted.
#[derive(Debug, Clone)]
pub struct OptimizerState {
    pub parameters: DVector<f64>,
    pub value: f64,
    pub gradient: DVector<f64>,
    pub iteration: usize,
    pub status: OptimizationStatus,
    /// Objective value after each accepted iteration, starting point first.
    pub history: Vec<f64>,
    corrections: VecDeque<Correction>,
}

impl OptimizerState {
    fn new(parameters: DVector<f64>, value: f64, gradient: DVector<f64>, history_size: usize) -> Self {
        Self {
            parameters,
            value,
            gradient,
            iteration: 0,
            status: OptimizationStatus::Exhausted,
            history: vec![value],
            corrections: VecDeque::with_capacity(history_size),
        }
    }

    /// Move to an accepted point, recording the curvature pair when it is usable.
    fn advance(&mut self, parameters: DVector<f64>, value: f64, gradient: DVector<f64>, history_size: usize) {
        let s = &parameters - &self.parameters;
        let y = &gradient - &self.gradient;
        let sy = s.dot(&y);
        if sy > 1e-10 {
            if self.corrections.len() >= history_size {
                self.corrections.pop_front();
            }
            self.corrections.push_back(Correction { s, y, rho: 1.0 / sy });
        }
        self.parameters = parameters;
        self.value = value;
        self.gradient = gradient;
        self.iteration += 1;
        self.history.push(value);
    }

    fn into_result(self) -> OptimizationResult {
        OptimizationResult {
            parameters: self.parameters,
            value: self.value,
            iterations: self.iteration,
            status: self.status,
            history: self.history,
        }
    }
}

impl Optimizer for Lbfgs {
    fn minimize(
        &self,
        objective: &mut dyn Objective,
        x0: DVector<f64>,
        max_iterations: usize,
        callback: &mut dyn FnMut(&IterationInfo),
    ) -> error::Result<OptimizationResult> {
        let cfg = &self.config;
        let checker = ConvergenceChecker::new(cfg.tolerance, 1);

        let (value, gradient) = objective.evaluate(&x0)?;
        let mut state = OptimizerState::new(x0, value, gradient, cfg.history_size);

        while state.iteration < max_iterations {
            let gradient_norm = state.gradient.norm();
            if !(gradient_norm > cfg.gradient_tolerance) {
                state.status = OptimizationStatus::Converged;
                break;
            }

            let mut direction = self.direction(&state.gradient, &state.corrections);
            let mut slope = state.gradient.dot(&direction);
            if !(slope < 0.0) || direction.iter().any(|v| !v.is_finite()) {
                // Stale curvature; restart from steepest descent.
                state.corrections.clear();
                direction = -&state.gradient / gradient_norm;
                slope = state.gradient.dot(&direction);
            }
            let length = direction.norm();
            if length > cfg.max_step {
                direction *= cfg.max_step / length;
                slope *= cfg.max_step / length;
            }

            let mut step = 1.0;
            let mut accepted = None;
            for _ in 0..cfg.max_line_search_steps {
                let trial = &state.parameters + &direction * step;
                // A failed evaluation rejects the trial like an insufficient decrease.
                if let Ok((trial_value, trial_gradient)) = objective.evaluate(&trial) {
                    if trial_value.is_finite() && trial_value <= state.value + cfg.armijo * step * slope {
                        accepted = Some((trial, trial_value, trial_gradient));
                        break;
                    }
                }
                step *= 0.5;
            }

            let Some((x_new, value_new, gradient_new)) = accepted else {
                tracing::debug!(iterations = state.iteration, "line search found no improving step");
                state.status = OptimizationStatus::Converged;
                break;
            };

            state.advance(x_new, value_new, gradient_new, cfg.history_size);

            callback(&IterationInfo {
                iteration: state.iteration,
                value: state.value,
                step_length: step * direction.norm(),
                gradient_norm: state.gradient.norm(),
            });

            if checker.check_convergence(&state.history) {
                state.status = OptimizationStatus::Converged;
                break;
            }
        }

        Ok(state.into_result())
    }
}
