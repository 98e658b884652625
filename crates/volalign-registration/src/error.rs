//! Error types for the registration pipeline.
//!
//! Loader failures arrive through `From<LoadError>` and keep their variant.
//! Convergence problems are reported as events, never as errors.

use std::path::PathBuf;
use thiserror::Error;
use volalign_io::LoadError;

#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Unusable input volume (missing or singular affine, empty array).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Inconsistent stage list, schedule or metric/optimizer settings.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Unreadable volume {}: {reason}", .path.display())]
    UnreadableFormat { path: PathBuf, reason: String },

    /// No fixed sample maps inside the moving volume.
    #[error("Empty overlap: {0}")]
    EmptyOverlap(String),

    #[error("Singular transform: {0}")]
    SingularTransform(String),

    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    /// A tensor could not be read back from the backend.
    #[error("Tensor backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn empty_overlap(msg: impl Into<String>) -> Self {
        Self::EmptyOverlap(msg.into())
    }

    pub fn singular_transform(msg: impl Into<String>) -> Self {
        Self::SingularTransform(msg.into())
    }

    pub fn numerical_instability(msg: impl Into<String>) -> Self {
        Self::NumericalInstability(msg.into())
    }

    pub fn backend(msg: impl std::fmt::Display) -> Self {
        Self::Backend(msg.to_string())
    }
}

impl From<LoadError> for RegistrationError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::InvalidInput(msg) => Self::InvalidInput(msg),
            LoadError::FileNotFound(path) => Self::FileNotFound(path),
            LoadError::UnreadableFormat { path, reason } => Self::UnreadableFormat { path, reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistrationError::configuration("level_iters has 2 entries, sigmas has 3");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: level_iters has 2 entries, sigmas has 3"
        );
        assert!(RegistrationError::empty_overlap("level 0").to_string().starts_with("Empty overlap"));
    }

    #[test]
    fn test_load_error_keeps_variant() {
        let err: RegistrationError = LoadError::invalid_input("no affine").into();
        assert!(matches!(err, RegistrationError::InvalidInput(ref m) if m == "no affine"));

        let err: RegistrationError = LoadError::FileNotFound(PathBuf::from("x.nii")).into();
        assert!(matches!(err, RegistrationError::FileNotFound(_)));

        let err: RegistrationError = LoadError::unreadable("x.nii", "truncated").into();
        assert!(matches!(err, RegistrationError::UnreadableFormat { .. }));
    }
}
