//! Validation utilities for registration settings.
//!
//! Every check here runs before any numeric work and fails with
//! [`RegistrationError::Configuration`].

use crate::config::{RegistrationSchedule, StageKind};
use crate::error::{RegistrationError, Result};
use crate::optimizer::LbfgsConfig;

/// Stage list must be a non-empty subsequence of the canonical order.
pub fn validate_stages(stages: &[StageKind]) -> Result<()> {
    if stages.is_empty() {
        return Err(RegistrationError::configuration("at least one stage is required"));
    }
    for pair in stages.windows(2) {
        if pair[0] >= pair[1] {
            return Err(RegistrationError::configuration(format!(
                "stages must follow center_of_mass, translation, rigid, affine without repeats; \
                 found {} before {}",
                pair[0], pair[1]
            )));
        }
    }
    Ok(())
}

/// Parallel schedule sequences must agree in length.
///
/// `needs_levels` requires at least one level (some stage is iterative).
pub fn validate_schedule(schedule: &RegistrationSchedule, needs_levels: bool) -> Result<()> {
    let (iters, sigmas, factors) = (
        schedule.level_iters.len(),
        schedule.sigmas.len(),
        schedule.factors.len(),
    );
    if iters != sigmas || iters != factors {
        return Err(RegistrationError::configuration(format!(
            "level_iters, sigmas and factors must have equal lengths (got {iters}, {sigmas}, {factors})"
        )));
    }
    if needs_levels && iters == 0 {
        return Err(RegistrationError::configuration(
            "iterative stages need at least one pyramid level",
        ));
    }
    if let Some(factor) = schedule.factors.iter().find(|&&f| f == 0) {
        return Err(RegistrationError::configuration(format!(
            "subsampling factors must be at least 1, got {factor}"
        )));
    }
    if let Some(sigma) = schedule.sigmas.iter().find(|s| !s.is_finite() || **s < 0.0) {
        return Err(RegistrationError::configuration(format!(
            "smoothing sigmas must be finite and non-negative, got {sigma}"
        )));
    }
    Ok(())
}

/// Validate histogram parameters.
pub fn validate_histogram_params(num_bins: usize, parzen_sigma: f64) -> Result<()> {
    if num_bins < 2 {
        return Err(RegistrationError::configuration(
            "number of histogram bins must be at least 2",
        ));
    }
    if num_bins > 1024 {
        return Err(RegistrationError::configuration(format!(
            "number of histogram bins too large: {num_bins}"
        )));
    }
    if !(parzen_sigma.is_finite() && parzen_sigma > 0.0) {
        return Err(RegistrationError::configuration(format!(
            "Parzen window width must be positive, got {parzen_sigma}"
        )));
    }
    Ok(())
}

pub fn validate_sampling_proportion(proportion: f64) -> Result<()> {
    if !(proportion > 0.0 && proportion <= 1.0) {
        return Err(RegistrationError::configuration(format!(
            "sampling proportion must lie in (0, 1], got {proportion}"
        )));
    }
    Ok(())
}

/// Validate L-BFGS settings.
pub fn validate_lbfgs(config: &LbfgsConfig) -> Result<()> {
    if config.history_size < 1 {
        return Err(RegistrationError::configuration(
            "L-BFGS history size must be at least 1",
        ));
    }
    if config.history_size > 100 {
        return Err(RegistrationError::configuration(format!(
            "L-BFGS history size too large: {}",
            config.history_size
        )));
    }
    if !(config.max_step.is_finite() && config.max_step > 0.0) {
        return Err(RegistrationError::configuration(format!(
            "maximum step length must be positive, got {}",
            config.max_step
        )));
    }
    if !(config.tolerance >= 0.0 && config.gradient_tolerance >= 0.0) {
        return Err(RegistrationError::configuration("tolerances must be non-negative"));
    }
    if config.max_line_search_steps == 0 {
        return Err(RegistrationError::configuration(
            "line search needs at least one trial step",
        ));
    }
    if !(config.armijo > 0.0 && config.armijo < 1.0) {
        return Err(RegistrationError::configuration(format!(
            "Armijo constant must lie in (0, 1), got {}",
            config.armijo
        )));
    }
    Ok(())
}

/// Check for convergence based on loss history.
#[derive(Debug, Clone)]
pub struct ConvergenceChecker {
    /// Minimum relative improvement over the window to keep going.
    pub min_improvement: f64,
    /// Number of iterations in the window.
    pub patience: usize,
}

impl Default for ConvergenceChecker {
    fn default() -> Self {
        Self {
            min_improvement: 1e-6,
            patience: 1,
        }
    }
}

impl ConvergenceChecker {
    pub fn new(min_improvement: f64, patience: usize) -> Self {
        Self {
            min_improvement,
            patience: patience.max(1),
        }
    }

    /// True when the loss improved by less than `min_improvement` (relative)
    /// over the last `patience` iterations.
    pub fn check_convergence(&self, loss_history: &[f64]) -> bool {
        if loss_history.len() < self.patience + 1 {
            return false;
        }
        let start = loss_history[loss_history.len() - self.patience - 1];
        let current = loss_history[loss_history.len() - 1];
        let relative_improvement = (start - current) / (start.abs() + 1e-10);
        relative_improvement < self.min_improvement
    }
}
