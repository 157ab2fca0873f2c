//! Analysis utilities for code intelligence
//!
//! Contains dependency graph construction, centrality ranking, cycle
//! detection and impact analysis.

pub mod builder;
pub mod centrality;
pub mod cycles;
pub mod dependencies;
pub mod graph;
pub mod impact;
pub mod rank;
pub mod resolve;

// Re-export commonly used items
pub use builder::{BuildOptions, BuildOutcome, GraphBuilder};
pub use centrality::{Algorithm, CentralityCache, CentralityParams, CentralityResult};
pub use cycles::{Cycle, find_cycles};
pub use dependencies::{ImportAnalyzer, TreeSitterImportAnalyzer};
pub use graph::{DependencyGraph, GraphStatistics};
pub use impact::{ImpactAnalyzer, ImpactOptions, ImpactReport, PatternTestHeuristic, TestHeuristic};
pub use resolve::{LanguageResolver, ResolverRegistry};
