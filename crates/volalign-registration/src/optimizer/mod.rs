//! Optimizers over host-side parameter vectors.

pub mod trait_;
pub mod lbfgs;

pub use trait_::{IterationInfo, Objective, OptimizationResult, OptimizationStatus, Optimizer};
pub use lbfgs::{Lbfgs, LbfgsConfig, OptimizerState};
