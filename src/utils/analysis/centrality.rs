//! Centrality ranking
//!
//! Three scorers over the file graph:
//! - **degree**: normalized in + out degree
//! - **pagerank**: random-walk visitation along import edges, dangling mass
//!   spread uniformly
//! - **eigenvector**: importance flowing from dependents to what they depend on
//!
//! Results are stamped with the graph version they were computed against and
//! cached per `(algorithm, version)`.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GraphError;
use crate::utils::analysis::graph::DependencyGraph;

/// Centrality algorithm selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Degree,
    PageRank,
    Eigenvector,
}

type Scorer = fn(&DependencyGraph, &CentralityParams) -> Computed;

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [Algorithm::Degree, Algorithm::PageRank, Algorithm::Eigenvector];

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Degree => "degree",
            Algorithm::PageRank => "pagerank",
            Algorithm::Eigenvector => "eigenvector",
        }
    }

    fn scorer(self) -> Scorer {
        match self {
            Algorithm::Degree => degree,
            Algorithm::PageRank => pagerank,
            Algorithm::Eigenvector => eigenvector,
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GraphError::UnknownAlgorithm(s.to_string()))
    }
}

/// Tuning for the iterative scorers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentralityParams {
    /// PageRank damping factor (alpha)
    pub damping: f64,
    /// Convergence threshold
    pub tolerance: f64,
    pub pagerank_max_iterations: usize,
    pub eigenvector_max_iterations: usize,
}

impl Default for CentralityParams {
    fn default() -> Self {
        Self {
            damping: 0.85,
            tolerance: 1e-6,
            pagerank_max_iterations: 100,
            eigenvector_max_iterations: 1000,
        }
    }
}

impl CentralityParams {
    pub fn validate(&self) -> Result<(), GraphError> {
        if !(self.damping > 0.0 && self.damping < 1.0) {
            return Err(GraphError::Configuration(format!(
                "damping must be in (0, 1), got {}",
                self.damping
            )));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(GraphError::Configuration(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.pagerank_max_iterations == 0 || self.eigenvector_max_iterations == 0 {
            return Err(GraphError::Configuration(
                "iteration limits must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Scores for every file in one graph version
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CentralityResult {
    pub algorithm: Algorithm,
    /// Graph version the scores were computed against
    pub version: u64,
    pub scores: BTreeMap<PathBuf, f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl CentralityResult {
    pub fn score(&self, path: &Path) -> f64 {
        self.scores.get(path).copied().unwrap_or(0.0)
    }

    /// Highest score first, ties broken by path.
    pub fn ranked(&self) -> Vec<(&PathBuf, f64)> {
        let mut ranked: Vec<(&PathBuf, f64)> = self.scores.iter().map(|(p, s)| (p, *s)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }

    pub fn top(&self, n: usize) -> Vec<(&PathBuf, f64)> {
        let mut ranked = self.ranked();
        ranked.truncate(n);
        ranked
    }

    /// Smallest and largest score, `(0, 0)` when empty.
    pub fn bounds(&self) -> (f64, f64) {
        let mut values = self.scores.values().copied();
        let Some(first) = values.next() else {
            return (0.0, 0.0);
        };
        values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)))
    }

    pub fn is_stale_for(&self, graph: &DependencyGraph) -> bool {
        self.version != graph.version()
    }
}

struct Computed {
    scores: Vec<f64>,
    iterations: usize,
    converged: bool,
}

/// Dense view of the graph: node order is path order.
struct Indexed<'g> {
    nodes: Vec<&'g PathBuf>,
    /// `incoming[v]` = indices of files importing `v`
    incoming: Vec<Vec<usize>>,
    out_degree: Vec<usize>,
}

impl<'g> Indexed<'g> {
    fn new(graph: &'g DependencyGraph) -> Self {
        let nodes: Vec<&PathBuf> = graph.nodes().iter().collect();
        let position: BTreeMap<&Path, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, p)| (p.as_path(), i))
            .collect();

        let incoming = nodes
            .iter()
            .map(|node| {
                graph
                    .dependents(node)
                    .iter()
                    .filter_map(|from| position.get(from.as_path()).copied())
                    .collect()
            })
            .collect();
        let out_degree = nodes.iter().map(|node| graph.out_degree(node)).collect();

        Self {
            nodes,
            incoming,
            out_degree,
        }
    }
}

/// Runs `algorithm` over `graph`. Identical inputs give identical output.
pub fn compute(graph: &DependencyGraph, algorithm: Algorithm, params: &CentralityParams) -> CentralityResult {
    let computed = (algorithm.scorer())(graph, params);
    let scores = graph
        .nodes()
        .iter()
        .cloned()
        .zip(computed.scores)
        .collect();

    CentralityResult {
        algorithm,
        version: graph.version(),
        scores,
        iterations: computed.iterations,
        converged: computed.converged,
    }
}

fn degree(graph: &DependencyGraph, _params: &CentralityParams) -> Computed {
    let n = graph.node_count();
    let scores = graph
        .nodes()
        .iter()
        .map(|node| {
            if n > 1 {
                (graph.in_degree(node) + graph.out_degree(node)) as f64 / (2.0 * (n - 1) as f64)
            } else {
                0.0
            }
        })
        .collect();
    Computed {
        scores,
        iterations: 1,
        converged: true,
    }
}

fn pagerank(graph: &DependencyGraph, params: &CentralityParams) -> Computed {
    let index = Indexed::new(graph);
    let n = index.nodes.len();
    if n == 0 {
        return Computed {
            scores: Vec::new(),
            iterations: 0,
            converged: true,
        };
    }

    let nf = n as f64;
    let alpha = params.damping;
    let mut scores = vec![1.0 / nf; n];
    let mut iterations = 0;
    let mut converged = false;

    for iteration in 1..=params.pagerank_max_iterations {
        // Files that import nothing hand their mass to everyone
        let dangling: f64 = (0..n)
            .filter(|&u| index.out_degree[u] == 0)
            .map(|u| scores[u])
            .sum();
        let base = (1.0 - alpha) / nf + alpha * dangling / nf;

        let next: Vec<f64> = (0..n)
            .map(|v| {
                let inflow: f64 = index.incoming[v]
                    .iter()
                    .map(|&u| scores[u] / index.out_degree[u] as f64)
                    .sum();
                base + alpha * inflow
            })
            .collect();

        let delta = next
            .iter()
            .zip(&scores)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        scores = next;
        iterations = iteration;
        if delta < params.tolerance {
            converged = true;
            break;
        }
    }

    Computed {
        scores,
        iterations,
        converged,
    }
}

fn eigenvector(graph: &DependencyGraph, params: &CentralityParams) -> Computed {
    let index = Indexed::new(graph);
    let n = index.nodes.len();
    if n == 0 {
        return Computed {
            scores: Vec::new(),
            iterations: 0,
            converged: true,
        };
    }

    let nf = n as f64;
    let mut scores = vec![1.0 / nf; n];
    let mut iterations = 0;
    let mut converged = false;

    for iteration in 1..=params.eigenvector_max_iterations {
        // Iterating (A + I) keeps acyclic graphs from collapsing to zero
        // while leaving the dominant eigenvector unchanged.
        let mut next = scores.clone();
        for v in 0..n {
            for &u in &index.incoming[v] {
                next[v] += scores[u];
            }
        }

        let norm = next.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm == 0.0 {
            break;
        }
        for x in &mut next {
            *x /= norm;
        }

        let delta: f64 = next.iter().zip(&scores).map(|(a, b)| (a - b).abs()).sum();
        scores = next;
        iterations = iteration;
        if delta < nf * params.tolerance {
            converged = true;
            break;
        }
    }

    Computed {
        scores,
        iterations,
        converged,
    }
}

type SlotKey = (Algorithm, u64);
type Slot = Arc<OnceLock<Arc<CentralityResult>>>;

/// Centrality results for one analysis session.
///
/// Keyed by `(algorithm, graph version)`, so a result for an older graph is
/// simply never looked up again. Concurrent requests for the same key share
/// one computation. Holds at most `capacity` entries, dropping the oldest
/// insertion first. A capacity of zero disables caching.
pub struct CentralityCache {
    params: CentralityParams,
    capacity: usize,
    slots: DashMap<SlotKey, Slot>,
    order: Mutex<VecDeque<SlotKey>>,
    computations: AtomicUsize,
}

impl std::fmt::Debug for CentralityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CentralityCache")
            .field("params", &self.params)
            .field("capacity", &self.capacity)
            .field("entries", &self.slots.len())
            .finish()
    }
}

impl CentralityCache {
    pub fn new(params: CentralityParams, capacity: usize) -> Self {
        Self {
            params,
            capacity,
            slots: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            computations: AtomicUsize::new(0),
        }
    }

    pub fn params(&self) -> &CentralityParams {
        &self.params
    }

    /// Returns the cached result for the graph's current version, computing
    /// it at most once.
    pub fn get_or_compute(&self, graph: &DependencyGraph, algorithm: Algorithm) -> Arc<CentralityResult> {
        if self.capacity == 0 {
            return Arc::new(self.run(graph, algorithm));
        }

        let key = (algorithm, graph.version());
        let (slot, inserted) = match self.slots.entry(key) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let slot: Slot = Arc::new(OnceLock::new());
                entry.insert(Arc::clone(&slot));
                (slot, true)
            }
        };
        if inserted {
            self.track(key);
        }

        Arc::clone(slot.get_or_init(|| Arc::new(self.run(graph, algorithm))))
    }

    /// Cached result, if one is ready for this graph version.
    pub fn get(&self, graph: &DependencyGraph, algorithm: Algorithm) -> Option<Arc<CentralityResult>> {
        self.slots
            .get(&(algorithm, graph.version()))
            .and_then(|slot| slot.get().cloned())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&self) {
        let mut order = self.order.lock().unwrap_or_else(|e| e.into_inner());
        order.clear();
        self.slots.clear();
    }

    /// Number of real computations performed so far.
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    fn run(&self, graph: &DependencyGraph, algorithm: Algorithm) -> CentralityResult {
        self.computations.fetch_add(1, Ordering::Relaxed);
        let result = compute(graph, algorithm, &self.params);
        debug!(
            algorithm = %algorithm,
            version = result.version,
            iterations = result.iterations,
            converged = result.converged,
            "centrality computed"
        );
        result
    }

    fn track(&self, key: SlotKey) {
        let mut order = self.order.lock().unwrap_or_else(|e| e.into_inner());
        order.push_back(key);
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                self.slots.remove(&oldest);
            }
        }
    }
}
