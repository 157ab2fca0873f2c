use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::utils::analysis::cycles::find_cycles;

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);
static NO_PATHS: BTreeSet<PathBuf> = BTreeSet::new();

/// Hands out graph versions. Process-wide so two distinct graph states can
/// never carry the same stamp.
fn next_version() -> u64 {
    NEXT_VERSION.fetch_add(1, Ordering::Relaxed)
}

/// File-level dependency graph.
///
/// `edges[a]` holds what `a` imports, `reverse_edges[b]` holds who imports `b`.
/// Both maps are kept as exact transposes of each other by every mutation,
/// self-loops are refused and parallel edges collapse into set membership.
/// Cycles are ordinary data.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyGraph {
    nodes: BTreeSet<PathBuf>,
    edges: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    reverse_edges: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    version: u64,
}

/// Summary counts for a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct GraphStatistics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub cycles: usize,
    /// Files with no outgoing dependencies
    pub leaf_nodes: usize,
    /// Files nothing depends on
    pub root_nodes: usize,
    pub isolated_nodes: usize,
}

impl std::fmt::Display for GraphStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Graph Statistics")?;
        writeln!(f, "================")?;
        writeln!(f, "Files:          {}", self.total_nodes)?;
        writeln!(f, "Dependencies:   {}", self.total_edges)?;
        writeln!(f, "Cycles:         {}", self.cycles)?;
        writeln!(f, "Leaf files:     {}", self.leaf_nodes)?;
        writeln!(f, "Root files:     {}", self.root_nodes)?;
        writeln!(f, "Isolated files: {}", self.isolated_nodes)
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            nodes: BTreeSet::new(),
            edges: BTreeMap::new(),
            reverse_edges: BTreeMap::new(),
            version: next_version(),
        }
    }

    /// Version stamp. Changes on every structural mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn add_node(&mut self, path: PathBuf) {
        if self.nodes.insert(path) {
            self.version = next_version();
        }
    }

    /// Adds `from -> to`, creating both nodes as needed.
    ///
    /// Returns `false` for self-references and for edges already present.
    pub fn add_edge(&mut self, from: PathBuf, to: PathBuf) -> bool {
        if from == to {
            self.add_node(from);
            return false;
        }

        let added = self
            .edges
            .entry(from.clone())
            .or_default()
            .insert(to.clone());
        if added {
            self.reverse_edges
                .entry(to.clone())
                .or_default()
                .insert(from.clone());
            self.version = next_version();
        }
        self.add_node(from);
        self.add_node(to);
        added
    }

    pub fn remove_edge(&mut self, from: &Path, to: &Path) -> bool {
        let removed = detach(&mut self.edges, from, to);
        if removed {
            detach(&mut self.reverse_edges, to, from);
            self.version = next_version();
        }
        removed
    }

    /// Removes a node together with every edge touching it.
    pub fn remove_node(&mut self, path: &Path) -> bool {
        if !self.nodes.remove(path) {
            return false;
        }
        if let Some(targets) = self.edges.remove(path) {
            for to in targets {
                detach(&mut self.reverse_edges, &to, path);
            }
        }
        if let Some(sources) = self.reverse_edges.remove(path) {
            for from in sources {
                detach(&mut self.edges, &from, path);
            }
        }
        self.version = next_version();
        true
    }

    pub fn nodes(&self) -> &BTreeSet<PathBuf> {
        &self.nodes
    }

    pub fn edges(&self) -> &BTreeMap<PathBuf, BTreeSet<PathBuf>> {
        &self.edges
    }

    pub fn reverse_edges(&self) -> &BTreeMap<PathBuf, BTreeSet<PathBuf>> {
        &self.reverse_edges
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.nodes.contains(path)
    }

    /// Files `path` imports.
    pub fn dependencies(&self, path: &Path) -> &BTreeSet<PathBuf> {
        self.edges.get(path).unwrap_or(&NO_PATHS)
    }

    /// Files importing `path`.
    pub fn dependents(&self, path: &Path) -> &BTreeSet<PathBuf> {
        self.reverse_edges.get(path).unwrap_or(&NO_PATHS)
    }

    pub fn out_degree(&self, path: &Path) -> usize {
        self.dependencies(path).len()
    }

    pub fn in_degree(&self, path: &Path) -> usize {
        self.dependents(path).len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Same nodes and same edges, regardless of version.
    pub fn same_topology(&self, other: &DependencyGraph) -> bool {
        self.nodes == other.nodes && self.edges == other.edges
    }

    pub fn statistics(&self) -> GraphStatistics {
        let mut stats = GraphStatistics {
            total_nodes: self.node_count(),
            total_edges: self.edge_count(),
            cycles: find_cycles(self).len(),
            ..Default::default()
        };
        for node in &self.nodes {
            let leaf = self.out_degree(node) == 0;
            let root = self.in_degree(node) == 0;
            stats.leaf_nodes += usize::from(leaf);
            stats.root_nodes += usize::from(root);
            stats.isolated_nodes += usize::from(leaf && root);
        }
        stats
    }

    /// Everything reachable from `path` by following imports, up to `max_depth` hops.
    pub fn transitive_dependencies(&self, path: &Path, max_depth: usize) -> BTreeSet<PathBuf> {
        let mut reached = BTreeSet::new();
        if !self.contains(path) {
            return reached;
        }

        let mut visited: HashSet<&Path> = HashSet::new();
        visited.insert(path);
        let mut queue: VecDeque<(&Path, usize)> = VecDeque::new();
        queue.push_back((path, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for next in self.dependencies(current) {
                if visited.insert(next.as_path()) {
                    reached.insert(next.clone());
                    queue.push_back((next.as_path(), depth + 1));
                }
            }
        }
        reached
    }

    /// Sorts files topologically.
    /// `comparator`: A function to compare two independent items (tie-breaker).
    /// If A depends on B, B comes before A.
    pub fn sort_topologically<F>(&self, mut comparator: F) -> Vec<PathBuf>
    where
        F: FnMut(&PathBuf, &PathBuf) -> std::cmp::Ordering,
    {
        use topological_sort::TopologicalSort;
        let mut ts = TopologicalSort::<PathBuf>::new();

        for node in &self.nodes {
            ts.insert(node.clone());
        }

        for (from, targets) in &self.edges {
            for to in targets {
                ts.add_dependency(to.clone(), from.clone());
            }
        }

        let mut result = Vec::new();
        while !ts.is_empty() {
            let mut batch = ts.pop_all();
            if batch.is_empty() {
                // Only cycles left
                break;
            }
            batch.sort_by(|a, b| comparator(a, b));
            result.extend(batch);
        }

        if result.len() < self.nodes.len() {
            let included: HashSet<&PathBuf> = result.iter().collect();
            let mut remaining: Vec<PathBuf> = self
                .nodes
                .iter()
                .filter(|n| !included.contains(n))
                .cloned()
                .collect();
            remaining.sort_by(|a, b| comparator(a, b));
            result.extend(remaining);
        }

        result
    }
}

fn detach(map: &mut BTreeMap<PathBuf, BTreeSet<PathBuf>>, key: &Path, value: &Path) -> bool {
    let Some(set) = map.get_mut(key) else {
        return false;
    };
    let removed = set.remove(value);
    if set.is_empty() {
        map.remove(key);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    fn assert_transposed(graph: &DependencyGraph) {
        for (from, targets) in graph.edges() {
            for to in targets {
                assert!(graph.dependents(to).contains(from), "{from:?} -> {to:?} missing in reverse");
            }
        }
        for (to, sources) in graph.reverse_edges() {
            for from in sources {
                assert!(graph.dependencies(from).contains(to), "{to:?} <- {from:?} missing forward");
            }
        }
    }

    #[test]
    fn test_add_edge_keeps_transpose() {
        let mut graph = DependencyGraph::new();
        assert!(graph.add_edge(p("a.rs"), p("b.rs")));
        assert!(graph.add_edge(p("b.rs"), p("c.rs")));
        assert!(graph.add_edge(p("c.rs"), p("a.rs")));
        assert_transposed(&graph);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn test_self_loops_and_duplicates_collapse() {
        let mut graph = DependencyGraph::new();
        assert!(!graph.add_edge(p("a.rs"), p("a.rs")));
        assert!(graph.add_edge(p("a.rs"), p("b.rs")));
        assert!(!graph.add_edge(p("a.rs"), p("b.rs")));

        assert_eq!(graph.edge_count(), 1);
        assert!(graph.contains(Path::new("a.rs")));
        assert!(!graph.dependencies(Path::new("a.rs")).contains(Path::new("a.rs")));
        assert!(!graph.dependents(Path::new("a.rs")).contains(Path::new("a.rs")));
    }

    #[test]
    fn test_version_bumps_only_on_structural_change() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(p("a.rs"), p("b.rs"));
        let before = graph.version();

        graph.add_edge(p("a.rs"), p("b.rs"));
        graph.add_node(p("a.rs"));
        assert_eq!(graph.version(), before);

        graph.add_edge(p("b.rs"), p("c.rs"));
        assert!(graph.version() > before);
    }

    #[test]
    fn test_remove_node_detaches_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(p("a.rs"), p("b.rs"));
        graph.add_edge(p("b.rs"), p("c.rs"));
        graph.add_edge(p("c.rs"), p("b.rs"));

        assert!(graph.remove_node(Path::new("b.rs")));
        assert_transposed(&graph);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.dependencies(Path::new("a.rs")).is_empty());
        assert!(graph.edges().is_empty());
        assert!(graph.reverse_edges().is_empty());
    }

    #[test]
    fn test_remove_edge() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(p("a.rs"), p("b.rs"));
        assert!(graph.remove_edge(Path::new("a.rs"), Path::new("b.rs")));
        assert!(!graph.remove_edge(Path::new("a.rs"), Path::new("b.rs")));
        assert_transposed(&graph);
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_statistics() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(p("a.rs"), p("b.rs"));
        graph.add_edge(p("b.rs"), p("a.rs"));
        graph.add_edge(p("c.rs"), p("a.rs"));
        graph.add_node(p("d.rs"));

        let stats = graph.statistics();
        assert_eq!(stats.total_nodes, 4);
        assert_eq!(stats.total_edges, 3);
        assert_eq!(stats.cycles, 1);
        // c has no dependents, d is isolated
        assert_eq!(stats.root_nodes, 2);
        assert_eq!(stats.leaf_nodes, 1);
        assert_eq!(stats.isolated_nodes, 1);
    }

    #[test]
    fn test_transitive_dependencies_bounded() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(p("a.rs"), p("b.rs"));
        graph.add_edge(p("b.rs"), p("c.rs"));
        graph.add_edge(p("c.rs"), p("d.rs"));

        let reached = graph.transitive_dependencies(Path::new("a.rs"), 2);
        assert_eq!(reached, BTreeSet::from([p("b.rs"), p("c.rs")]));
    }

    #[test]
    fn test_sort_topologically_puts_dependencies_first() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(p("a.rs"), p("b.rs"));
        graph.add_edge(p("b.rs"), p("c.rs"));
        graph.add_node(p("d.rs"));

        let sorted = graph.sort_topologically(|a, b| a.cmp(b));
        let pos = |name: &str| sorted.iter().position(|x| x == Path::new(name)).unwrap();
        assert!(pos("c.rs") < pos("b.rs"));
        assert!(pos("b.rs") < pos("a.rs"));
        assert_eq!(sorted.len(), 4);
    }

    #[test]
    fn test_sort_topologically_appends_cycles() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(p("a.rs"), p("b.rs"));
        graph.add_edge(p("b.rs"), p("a.rs"));
        graph.add_node(p("c.rs"));

        let sorted = graph.sort_topologically(|a, b| a.cmp(b));
        assert_eq!(sorted, vec![p("c.rs"), p("a.rs"), p("b.rs")]);
    }
}
