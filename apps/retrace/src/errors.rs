#![allow(dead_code)]

use thiserror::Error;

use crate::sources::SourceError;

/// Application-level error type. Only startup problems and a failed first
/// page abort a run; everything downstream degrades to partial output.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Roster error: {0}")]
    Roster(String),

    #[error("Revision source error: {0}")]
    Source(#[from] SourceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
