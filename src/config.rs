use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::utils::analysis::centrality::{Algorithm, CentralityParams};
use crate::utils::analysis::impact::ImpactOptions;

/// Default configuration file name, looked up in the current directory
pub const CONFIG_FILE: &str = "abyss-graph.toml";

/// Main configuration for graph analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Gates graph building, cycles, statistics and centrality
    pub enable_call_graph: bool,
    /// Gates change-impact analysis
    pub enable_impact_analysis: bool,
    /// Maximum number of files placed in one graph
    pub max_graph_size: usize,
    /// Reuse the last graph while the file set is unchanged
    pub cache_graphs: bool,
    /// Allowed centrality algorithms. The first one scores impact risk.
    pub centrality_algorithms: Vec<String>,
    /// Maximum centrality results kept per session
    pub max_centrality_cache_size: usize,
    /// Build time budget in seconds (0 disables it)
    pub performance_threshold_seconds: f64,
    /// Worker threads used for import extraction
    pub max_workers: usize,
    /// Extra glob patterns excluded from file discovery
    pub ignore_patterns: Vec<String>,
    /// Regex patterns identifying test files (empty uses the built-in set)
    pub test_patterns: Vec<String>,
    /// Go module path, e.g. "example.com/project"
    pub go_module: Option<String>,
    pub centrality: CentralityParams,
    pub impact: ImpactOptions,
}

impl Default for GraphConfig {
    fn default() -> Self {
        let defaults = vec![
            // Version Control
            ".git",
            ".hg",
            ".svn",
            // Build / Dependency
            "node_modules",
            "target",
            "dist",
            "build",
            "vendor",
            "venv",
            ".venv",
            "__pycache__",
        ];

        Self {
            enable_call_graph: true,
            enable_impact_analysis: true,
            max_graph_size: 10_000,
            cache_graphs: true,
            centrality_algorithms: Algorithm::ALL
                .into_iter()
                .map(|a| a.name().to_string())
                .collect(),
            max_centrality_cache_size: 32,
            performance_threshold_seconds: 30.0,
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            ignore_patterns: defaults.into_iter().map(String::from).collect(),
            test_patterns: Vec::new(),
            go_module: None,
            centrality: CentralityParams::default(),
            impact: ImpactOptions::default(),
        }
    }
}

impl GraphConfig {
    /// Validates every bound. Errors are configuration errors.
    pub fn validate(&self) -> Result<()> {
        if self.max_graph_size == 0 {
            return Err(GraphError::Configuration(
                "max_graph_size must be at least 1".into(),
            ));
        }
        if self.max_workers == 0 {
            return Err(GraphError::Configuration(
                "max_workers must be at least 1".into(),
            ));
        }
        if !self.performance_threshold_seconds.is_finite() || self.performance_threshold_seconds < 0.0 {
            return Err(GraphError::Configuration(format!(
                "performance_threshold_seconds must be a non-negative number, got {}",
                self.performance_threshold_seconds
            )));
        }
        self.algorithms()?;
        self.centrality.validate()?;
        self.impact.validate()?;
        Ok(())
    }

    /// Parses the allow-list, in configured order.
    pub fn algorithms(&self) -> Result<Vec<Algorithm>> {
        if self.centrality_algorithms.is_empty() {
            return Err(GraphError::Configuration(
                "centrality_algorithms must name at least one algorithm".into(),
            ));
        }

        let mut seen = HashSet::new();
        let mut algorithms = Vec::with_capacity(self.centrality_algorithms.len());
        for name in &self.centrality_algorithms {
            let algorithm: Algorithm = name.parse()?;
            if !seen.insert(algorithm) {
                return Err(GraphError::Configuration(format!(
                    "centrality algorithm `{algorithm}` listed twice"
                )));
            }
            algorithms.push(algorithm);
        }
        Ok(algorithms)
    }

    /// Algorithm used for impact risk: the first allowed one.
    pub fn default_algorithm(&self) -> Result<Algorithm> {
        self.algorithms()?
            .into_iter()
            .next()
            .ok_or_else(|| GraphError::Configuration("no centrality algorithm configured".into()))
    }

    /// Loads `abyss-graph.toml` from the current directory, if present.
    pub fn load_from_file() -> Result<Option<Self>> {
        let path = Path::new(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from_path(path).map(Some)
    }

    /// Loads and validates a configuration file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}
