//! Error types for scanmesh

use crate::quality::QualityMetrics;
use thiserror::Error;

/// Main error type for scanmesh operations
#[derive(Error, Debug)]
pub enum Error {
    /// NaN/Inf coordinates or out-of-range indices, rejected at ingestion
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Fewer points than the selected tier requires
    #[error("insufficient points: need at least {required}, got {actual}")]
    InsufficientPoints { required: usize, actual: usize },

    /// The implicit-surface solver did not converge or produced degenerate topology
    #[error("reconstruction failed: {0}")]
    ReconstructionFailed(String),

    /// A structurally valid mesh failed the post-hoc quality gate;
    /// recoverable by retrying with a relaxed tier or more input data
    #[error("mesh quality below threshold (overall {:.3})", .0.overall_quality)]
    QualityBelowThreshold(QualityMetrics),

    /// Invalid configuration or algorithm parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type alias for scanmesh operations
pub type Result<T> = std::result::Result<T, Error>;
