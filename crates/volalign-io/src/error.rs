//! Errors raised while turning user input into a volume.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    /// The input is structurally unusable (missing or singular affine, empty array).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The file exists but is not a readable 3-D NIfTI volume.
    #[error("Unreadable volume {}: {reason}", .path.display())]
    UnreadableFormat { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, LoadError>;

impl LoadError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn unreadable(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::UnreadableFormat {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
