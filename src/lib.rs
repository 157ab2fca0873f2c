//! Dependency graph engine: builds a file-level import graph and answers
//! centrality, cycle and change-impact queries over it.

pub mod config;
pub mod core;
pub mod error;
pub mod fs;
pub mod runner;
pub mod session;
pub mod utils;

// Re-export key items for convenience
pub use config::GraphConfig;
pub use crate::core::{ImportReference, Language, SourceFile};
pub use error::{FailureKind, Feature, FileFailure, GraphError, Result};
pub use session::AnalysisSession;
pub use utils::analysis::{
    Algorithm, BuildOutcome, CentralityResult, Cycle, DependencyGraph, GraphStatistics, ImpactOptions, ImpactReport,
};
