//! Circular dependency detection
//!
//! Iterative depth-first search with a three-state marker per node. A back
//! edge into a node still on the stack closes a cycle, which is rebuilt by
//! unwinding the stack to that node.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::utils::analysis::graph::DependencyGraph;

/// A dependency loop, rotated to start at its smallest path.
///
/// The closing edge back to the first node is implied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Cycle {
    nodes: Vec<PathBuf>,
}

impl Cycle {
    /// Builds the canonical rotation of `nodes`.
    pub fn canonical(mut nodes: Vec<PathBuf>) -> Self {
        if let Some(start) = nodes
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.cmp(b.1))
            .map(|(i, _)| i)
        {
            nodes.rotate_left(start);
        }
        Self { nodes }
    }

    pub fn nodes(&self) -> &[PathBuf] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.nodes.iter().any(|n| n == path)
    }
}

impl std::fmt::Display for Cycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for node in &self.nodes {
            write!(f, "{} -> ", node.display())?;
        }
        match self.nodes.first() {
            Some(first) => write!(f, "{}", first.display()),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnStack,
    Done,
}

/// Enumerates the circular dependency chains of `graph`.
///
/// Traversal starts from nodes in path order and follows edges in path order,
/// so discovery order is stable. Each cycle is reported once no matter where
/// the traversal entered it. Returns an empty list for acyclic graphs.
pub fn find_cycles(graph: &DependencyGraph) -> Vec<Cycle> {
    let mut marks: HashMap<&Path, Mark> = HashMap::with_capacity(graph.node_count());
    let mut seen: HashSet<Cycle> = HashSet::new();
    let mut cycles = Vec::new();

    for start in graph.nodes() {
        if marks.contains_key(start.as_path()) {
            continue;
        }

        // Each frame is a node plus the iterator over its remaining dependencies.
        let mut stack: Vec<&Path> = vec![start.as_path()];
        let mut frames = vec![graph.dependencies(start).iter()];
        marks.insert(start.as_path(), Mark::OnStack);

        while let Some(frame) = frames.last_mut() {
            match frame.next() {
                Some(next) => match marks.get(next.as_path()) {
                    None => {
                        marks.insert(next.as_path(), Mark::OnStack);
                        stack.push(next.as_path());
                        frames.push(graph.dependencies(next).iter());
                    }
                    Some(Mark::OnStack) => {
                        let from = stack
                            .iter()
                            .rposition(|n| *n == next.as_path())
                            .unwrap_or(0);
                        let cycle = Cycle::canonical(
                            stack[from..].iter().map(|n| n.to_path_buf()).collect(),
                        );
                        if seen.insert(cycle.clone()) {
                            cycles.push(cycle);
                        }
                    }
                    Some(Mark::Done) => {}
                },
                None => {
                    frames.pop();
                    if let Some(done) = stack.pop() {
                        marks.insert(done, Mark::Done);
                    }
                }
            }
        }
    }

    cycles
}
