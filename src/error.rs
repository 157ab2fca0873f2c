//! Error types for graph construction and analysis.
//!
//! Two layers:
//!
//! - **`GraphError`**: call-level failures (bad configuration, disabled
//!   features, worker pool setup). These surface synchronously and are never
//!   retried here.
//! - **`FileFailure`**: per-file problems collected during a build. A failing
//!   file becomes an isolated node; the build keeps going.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::utils::analysis::centrality::Algorithm;

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Optional features gated by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    CallGraph,
    ImpactAnalysis,
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CallGraph => write!(f, "call graph analysis"),
            Self::ImpactAnalysis => write!(f, "impact analysis"),
        }
    }
}

/// Top-level error type for graph operations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Invalid configuration value or call argument
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Algorithm name not recognised
    #[error("unknown centrality algorithm `{0}` (expected one of: degree, pagerank, eigenvector)")]
    UnknownAlgorithm(String),

    /// Algorithm recognised but not in the configured allow-list
    #[error("centrality algorithm `{0}` is not enabled in configuration")]
    AlgorithmNotAllowed(Algorithm),

    /// Feature switched off in configuration
    #[error("{0} is not enabled")]
    FeatureDisabled(Feature),

    /// Centrality scores and graph come from different builds
    #[error("centrality computed against graph version {result}, but graph is at version {graph}")]
    VersionMismatch { graph: u64, result: u64 },

    /// Worker pool could not be created
    #[error("worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl GraphError {
    /// Returns `true` for the configuration family of errors.
    ///
    /// These are fatal for the call that raised them and should be fixed by
    /// the caller, not retried.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::UnknownAlgorithm(_)
                | Self::AlgorithmNotAllowed(_)
                | Self::ConfigParse(_)
        )
    }
}

/// Problem encountered while processing a single file during a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    /// Project-relative path of the file that failed
    pub path: PathBuf,
    /// Category of the failure
    pub kind: FailureKind,
    /// Human-readable message
    pub message: String,
}

impl FileFailure {
    pub fn new(path: impl Into<PathBuf>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FileFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.path.display(), self.message, self.kind)
    }
}

impl std::error::Error for FileFailure {}

/// Categorization of per-file failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Source could not be parsed for imports
    Parse,
    /// Source could not be read
    Io,
    /// An import reference was malformed
    Resolution,
    /// The build budget ran out before the file was merged
    Timeout,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse => write!(f, "parse failed"),
            Self::Io => write!(f, "I/O error"),
            Self::Resolution => write!(f, "resolution failed"),
            Self::Timeout => write!(f, "timed out"),
        }
    }
}
