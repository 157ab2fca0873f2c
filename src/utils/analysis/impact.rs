//! Impact analysis for code changes
//!
//! Traces who depends on a changed file, how far the change can travel, and
//! how risky it is. Works on one graph snapshot plus the centrality scores
//! computed for that same snapshot.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::normalize_path;
use crate::error::{GraphError, Result};
use crate::utils::analysis::centrality::{Algorithm, CentralityResult};
use crate::utils::analysis::graph::DependencyGraph;

lazy_static! {
    static ref DEFAULT_TEST_PATTERNS: Vec<Regex> = vec![
        // Test directories anywhere in the path
        Regex::new(r"(^|/)(tests?|__tests__|specs?|testing)/").unwrap(),
        // test_foo.py, foo_test.go, foo.test.ts, foo.spec.js, foo_spec.rb
        Regex::new(r"(^|/)test_[^/]+$").unwrap(),
        Regex::new(r"_(test|spec)\.[^/]+$").unwrap(),
        Regex::new(r"\.(test|spec)\.[^/]+$").unwrap(),
        Regex::new(r"(^|/)conftest\.py$").unwrap(),
    ];
}

/// Decides which files are tests.
pub trait TestHeuristic: Send + Sync {
    fn is_test(&self, path: &Path) -> bool;
}

/// Regex-based test detection over `/`-separated paths
#[derive(Debug, Clone)]
pub struct PatternTestHeuristic {
    patterns: Vec<Regex>,
}

impl Default for PatternTestHeuristic {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_TEST_PATTERNS.clone(),
        }
    }
}

impl PatternTestHeuristic {
    /// Uses `patterns` instead of the built-in ones.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| {
                    GraphError::Configuration(format!("invalid test pattern `{}`: {e}", p.as_ref()))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}

impl TestHeuristic for PatternTestHeuristic {
    fn is_test(&self, path: &Path) -> bool {
        let path = path.to_string_lossy().replace('\\', "/");
        self.patterns.iter().any(|p| p.is_match(&path))
    }
}

/// Breaking-change potential for an affected file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeRisk {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ChangeRisk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeRisk::Low => write!(f, "LOW"),
            ChangeRisk::Medium => write!(f, "MEDIUM"),
            ChangeRisk::High => write!(f, "HIGH"),
        }
    }
}

/// Relative weight of each risk factor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub centrality: f64,
    pub dependents: f64,
    pub transitive: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            centrality: 1.0 / 3.0,
            dependents: 1.0 / 3.0,
            transitive: 1.0 / 3.0,
        }
    }
}

impl RiskWeights {
    fn total(&self) -> f64 {
        self.centrality + self.dependents + self.transitive
    }
}

/// Bounds and thresholds for one impact analysis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactOptions {
    /// Maximum reverse-edge hops followed from a target
    pub max_depth: usize,
    /// Maximum number of affected files collected per target
    pub max_affected: usize,
    pub weights: RiskWeights,
    /// Risk above which a direct dependent is a HIGH breaking change
    pub high_risk_threshold: f64,
    /// Risk at or below which the report's aggregate band is LOW
    pub low_risk_threshold: f64,
}

impl Default for ImpactOptions {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_affected: 100,
            weights: RiskWeights::default(),
            high_risk_threshold: 0.7,
            low_risk_threshold: 0.3,
        }
    }
}

impl ImpactOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_affected == 0 {
            return Err(GraphError::Configuration(
                "max_affected must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("high_risk_threshold", self.high_risk_threshold),
            ("low_risk_threshold", self.low_risk_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(GraphError::Configuration(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.low_risk_threshold > self.high_risk_threshold {
            return Err(GraphError::Configuration(
                "low_risk_threshold must not exceed high_risk_threshold".into(),
            ));
        }
        let w = &self.weights;
        if [w.centrality, w.dependents, w.transitive]
            .iter()
            .any(|x| !x.is_finite() || *x < 0.0)
        {
            return Err(GraphError::Configuration(
                "risk weights must be finite and non-negative".into(),
            ));
        }
        if w.total() <= 0.0 {
            return Err(GraphError::Configuration(
                "at least one risk weight must be positive".into(),
            ));
        }
        Ok(())
    }

    fn level(&self, risk: f64) -> ChangeRisk {
        if risk > self.high_risk_threshold {
            ChangeRisk::High
        } else if risk > self.low_risk_threshold {
            ChangeRisk::Medium
        } else {
            ChangeRisk::Low
        }
    }
}

/// Impact of changing one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetImpact {
    pub target: PathBuf,
    /// Files the target imports
    pub direct_dependencies: Vec<PathBuf>,
    /// Files importing the target
    pub reverse_dependencies: Vec<PathBuf>,
    /// Files reached over reverse edges, within the configured bounds
    pub transitive_affected: Vec<PathBuf>,
    /// Deepest hop that contributed a file
    pub depth_reached: usize,
    /// Traversal stopped at a bound while files were still reachable
    pub bounded: bool,
    pub centrality: f64,
    /// Risk in [0, 1]
    pub risk_score: f64,
    pub breaking_changes: BTreeMap<PathBuf, ChangeRisk>,
    pub suggested_tests: Vec<PathBuf>,
}

/// Per-target result. A missing target does not stop the others.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetOutcome {
    Analyzed(TargetImpact),
    NotFound { target: PathBuf },
}

impl TargetOutcome {
    pub fn target(&self) -> &Path {
        match self {
            TargetOutcome::Analyzed(impact) => &impact.target,
            TargetOutcome::NotFound { target } => target,
        }
    }

    pub fn impact(&self) -> Option<&TargetImpact> {
        match self {
            TargetOutcome::Analyzed(impact) => Some(impact),
            TargetOutcome::NotFound { .. } => None,
        }
    }
}

/// Union over every analyzed target
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CombinedImpact {
    pub direct_dependencies: BTreeSet<PathBuf>,
    pub reverse_dependencies: BTreeSet<PathBuf>,
    pub transitive_affected: BTreeSet<PathBuf>,
    pub suggested_tests: BTreeSet<PathBuf>,
}

/// Impact analysis result for a set of changed files
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactReport {
    pub targets: Vec<TargetOutcome>,
    pub combined: CombinedImpact,
    /// Maximum risk across analyzed targets
    pub aggregate_risk: f64,
    /// Centrality algorithm used for risk
    pub algorithm: Algorithm,
    pub graph_version: u64,
    #[serde(skip)]
    level: ChangeRisk,
}

impl ImpactReport {
    pub fn get(&self, target: &Path) -> Option<&TargetOutcome> {
        self.targets.iter().find(|t| t.target() == target)
    }

    pub fn not_found(&self) -> Vec<&Path> {
        self.targets
            .iter()
            .filter(|t| matches!(t, TargetOutcome::NotFound { .. }))
            .map(TargetOutcome::target)
            .collect()
    }

    /// Overall risk band for the aggregate score
    pub fn risk_level(&self) -> ChangeRisk {
        self.level
    }
}

impl std::fmt::Display for ImpactReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Impact Analysis")?;
        writeln!(f, "===============")?;

        for outcome in &self.targets {
            writeln!(f)?;
            let impact = match outcome {
                TargetOutcome::NotFound { target } => {
                    writeln!(f, "* {} (not found in graph)", target.display())?;
                    continue;
                }
                TargetOutcome::Analyzed(impact) => impact,
            };

            writeln!(
                f,
                "* {}  risk {:.0}%",
                impact.target.display(),
                impact.risk_score * 100.0
            )?;
            writeln!(f, "  Depends on: {}", impact.direct_dependencies.len())?;
            writeln!(f, "  Directly affected: {}", impact.reverse_dependencies.len())?;
            for file in impact.reverse_dependencies.iter().take(10) {
                writeln!(f, "    -> {}", file.display())?;
            }
            if impact.reverse_dependencies.len() > 10 {
                writeln!(f, "    ... and {} more", impact.reverse_dependencies.len() - 10)?;
            }
            write!(f, "  Transitively affected: {}", impact.transitive_affected.len())?;
            if impact.bounded {
                write!(f, " (bounded)")?;
            }
            writeln!(f)?;
        }

        writeln!(f)?;
        writeln!(
            f,
            "Aggregate risk: {:.0}% ({})",
            self.aggregate_risk * 100.0,
            self.level
        )?;

        if !self.combined.suggested_tests.is_empty() {
            writeln!(f)?;
            writeln!(f, "Suggested tests:")?;
            for test in &self.combined.suggested_tests {
                writeln!(f, "  {}", test.display())?;
            }
        }

        Ok(())
    }
}

/// Impact analyzer over one graph snapshot
pub struct ImpactAnalyzer<'a> {
    graph: &'a DependencyGraph,
    centrality: &'a CentralityResult,
    tests: &'a dyn TestHeuristic,
    options: ImpactOptions,
    centrality_bounds: (f64, f64),
    dependents_bounds: (usize, usize),
}

impl<'a> ImpactAnalyzer<'a> {
    /// Creates an analyzer. Fails when the options are invalid or the
    /// centrality scores belong to a different graph version.
    pub fn new(
        graph: &'a DependencyGraph,
        centrality: &'a CentralityResult,
        tests: &'a dyn TestHeuristic,
        options: ImpactOptions,
    ) -> Result<Self> {
        options.validate()?;
        if centrality.is_stale_for(graph) {
            return Err(GraphError::VersionMismatch {
                graph: graph.version(),
                result: centrality.version,
            });
        }

        let dependents_bounds = graph
            .nodes()
            .iter()
            .map(|n| graph.in_degree(n))
            .fold(None, |acc: Option<(usize, usize)>, d| match acc {
                None => Some((d, d)),
                Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
            })
            .unwrap_or((0, 0));

        Ok(Self {
            graph,
            centrality,
            tests,
            options,
            centrality_bounds: centrality.bounds(),
            dependents_bounds,
        })
    }

    /// Analyze impact of changed files
    pub fn analyze(&self, targets: &[PathBuf]) -> ImpactReport {
        let mut seen = HashSet::new();
        let mut outcomes = Vec::new();
        let mut combined = CombinedImpact::default();
        let mut aggregate_risk: f64 = 0.0;

        for raw in targets {
            let target = normalize_path(raw).unwrap_or_else(|| raw.clone());
            if !seen.insert(target.clone()) {
                continue;
            }

            let Some(impact) = self.analyze_target(&target) else {
                outcomes.push(TargetOutcome::NotFound { target });
                continue;
            };

            combined
                .direct_dependencies
                .extend(impact.direct_dependencies.iter().cloned());
            combined
                .reverse_dependencies
                .extend(impact.reverse_dependencies.iter().cloned());
            combined
                .transitive_affected
                .extend(impact.transitive_affected.iter().cloned());
            combined
                .suggested_tests
                .extend(impact.suggested_tests.iter().cloned());
            aggregate_risk = aggregate_risk.max(impact.risk_score);
            outcomes.push(TargetOutcome::Analyzed(impact));
        }

        ImpactReport {
            targets: outcomes,
            combined,
            aggregate_risk,
            algorithm: self.centrality.algorithm,
            graph_version: self.graph.version(),
            level: self.options.level(aggregate_risk),
        }
    }

    /// Impact of a single file, `None` when it is not in the graph.
    pub fn analyze_target(&self, target: &Path) -> Option<TargetImpact> {
        if !self.graph.contains(target) {
            return None;
        }

        let direct_dependencies: Vec<PathBuf> =
            self.graph.dependencies(target).iter().cloned().collect();
        let reverse: &BTreeSet<PathBuf> = self.graph.dependents(target);
        let (mut transitive_affected, depth_reached, bounded) = self.transitive_affected(target);
        let risk_score = self.risk_score(target, transitive_affected.len());

        let breaking_changes = transitive_affected
            .iter()
            .map(|file| {
                // Transitive-only dependents are MEDIUM regardless of risk
                let direct = reverse.contains(file);
                let level = if direct && risk_score > self.options.high_risk_threshold {
                    ChangeRisk::High
                } else {
                    ChangeRisk::Medium
                };
                (file.clone(), level)
            })
            .collect();

        transitive_affected.sort();
        let suggested_tests = transitive_affected
            .iter()
            .filter(|f| self.tests.is_test(f))
            .cloned()
            .collect();

        Some(TargetImpact {
            target: target.to_path_buf(),
            direct_dependencies,
            reverse_dependencies: reverse.iter().cloned().collect(),
            transitive_affected,
            depth_reached,
            bounded,
            centrality: self.centrality.score(target),
            risk_score,
            breaking_changes,
            suggested_tests,
        })
    }

    /// Breadth-first walk over reverse edges, stopping at `max_depth` hops or
    /// `max_affected` files, whichever comes first.
    ///
    /// Returns the files in discovery order, the deepest hop reached and
    /// whether a bound cut the walk short.
    pub fn transitive_affected(&self, target: &Path) -> (Vec<PathBuf>, usize, bool) {
        let mut collected = Vec::new();
        let mut depth_reached = 0;
        let mut bounded = false;

        let mut visited: HashSet<&Path> = HashSet::new();
        visited.insert(target);
        let mut queue: VecDeque<(&Path, usize)> = VecDeque::new();
        queue.push_back((target, 0));

        'walk: while let Some((current, depth)) = queue.pop_front() {
            let dependents = self.graph.dependents(current);
            if depth >= self.options.max_depth {
                if dependents.iter().any(|d| !visited.contains(d.as_path())) {
                    bounded = true;
                }
                continue;
            }
            for next in dependents {
                if visited.contains(next.as_path()) {
                    continue;
                }
                if collected.len() >= self.options.max_affected {
                    bounded = true;
                    break 'walk;
                }
                visited.insert(next.as_path());
                collected.push(next.clone());
                depth_reached = depth_reached.max(depth + 1);
                queue.push_back((next.as_path(), depth + 1));
            }
        }

        (collected, depth_reached, bounded)
    }

    /// Weighted, min-max normalized blend of centrality, direct dependent
    /// count and transitive reach. Monotonic in each factor, within [0, 1].
    pub fn risk_score(&self, target: &Path, transitive_count: usize) -> f64 {
        let (c_lo, c_hi) = self.centrality_bounds;
        let centrality = normalize(self.centrality.score(target), c_lo, c_hi);

        let (d_lo, d_hi) = self.dependents_bounds;
        let dependents = normalize(
            self.graph.in_degree(target) as f64,
            d_lo as f64,
            d_hi as f64,
        );

        // Transitive reach can be at most every other file, capped by max_affected
        let reach_cap = self
            .options
            .max_affected
            .min(self.graph.node_count().saturating_sub(1));
        let transitive = normalize(transitive_count as f64, 0.0, reach_cap as f64);

        let w = &self.options.weights;
        let score = (w.centrality * centrality + w.dependents * dependents + w.transitive * transitive)
            / w.total();
        score.clamp(0.0, 1.0)
    }
}

fn normalize(value: f64, lo: f64, hi: f64) -> f64 {
    if hi > lo {
        ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
    } else {
        0.0
    }
}
