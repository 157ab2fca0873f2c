//! Dependency graph construction
//!
//! ```text
//! files ──► priority cap ──► rayon pool (analyze + resolve, per file)
//!                                   │ crossbeam channel
//!                                   ▼
//!                       single writer merges edges ──► Arc<DependencyGraph>
//! ```
//!
//! Workers never touch the graph. The calling thread is the only writer, so
//! the published graph is never observed half-merged, and since merging is a
//! set union the result does not depend on completion order.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use tracing::{debug, info, warn};

use crate::config::GraphConfig;
use crate::core::{ImportReference, SourceFile, normalize_path};
use crate::error::{FailureKind, FileFailure, GraphError, Result};
use crate::utils::analysis::dependencies::ImportAnalyzer;
use crate::utils::analysis::graph::DependencyGraph;
use crate::utils::analysis::rank::prioritize;
use crate::utils::analysis::resolve::{Resolution, ResolverRegistry};

/// Limits applied to a single build
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    /// Maximum number of files turned into nodes
    pub max_graph_size: usize,
    /// Worker pool size
    pub max_workers: usize,
    /// Wall-clock budget. `None` waits for every file.
    pub time_budget: Option<Duration>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from_config(&GraphConfig::default())
    }
}

impl BuildOptions {
    pub fn from_config(config: &GraphConfig) -> Self {
        let time_budget = (config.performance_threshold_seconds > 0.0)
            .then(|| Duration::from_secs_f64(config.performance_threshold_seconds));
        Self {
            max_graph_size: config.max_graph_size,
            max_workers: config.max_workers,
            time_budget,
        }
    }

    fn validate(&self) -> Result<()> {
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
        Ok(())
    }
}

/// Result of a build, including everything that went wrong along the way
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub graph: Arc<DependencyGraph>,
    /// Input exceeded `max_graph_size`; only the highest-priority files were used
    pub truncated: bool,
    /// The time budget ran out; some files never had their edges merged
    pub incomplete: bool,
    /// Per-file failures, sorted by path
    pub failures: Vec<FileFailure>,
    /// Files left out by truncation
    pub skipped: Vec<PathBuf>,
    /// Imports that resolved to nothing inside the project
    pub unresolved_imports: usize,
    pub elapsed: Duration,
}

impl BuildOutcome {
    fn empty(elapsed: Duration) -> Self {
        Self {
            graph: Arc::new(DependencyGraph::new()),
            truncated: false,
            incomplete: false,
            failures: Vec::new(),
            skipped: Vec::new(),
            unresolved_imports: 0,
            elapsed,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.incomplete
    }
}

/// What a worker hands back for one file
struct FileEdges {
    path: PathBuf,
    targets: BTreeSet<PathBuf>,
    unresolved: usize,
    failure: Option<FileFailure>,
}

impl FileEdges {
    fn failed(path: PathBuf, failure: FileFailure) -> Self {
        Self {
            path,
            targets: BTreeSet::new(),
            unresolved: 0,
            failure: Some(failure),
        }
    }
}

/// Builds dependency graphs from a file list and an import source.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    resolvers: Arc<ResolverRegistry>,
    options: BuildOptions,
}

impl GraphBuilder {
    pub fn new(resolvers: Arc<ResolverRegistry>, options: BuildOptions) -> Self {
        Self { resolvers, options }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Builds a graph over `files`.
    ///
    /// Oversized input, unreadable files, malformed imports and an exhausted
    /// time budget are all reported in the outcome instead of failing the
    /// call. Only invalid options are an error.
    pub fn build(
        &self,
        files: &[SourceFile],
        analyzer: Arc<dyn ImportAnalyzer>,
    ) -> Result<BuildOutcome> {
        self.options.validate()?;
        let start = Instant::now();

        let mut failures = Vec::new();
        let mut unique: BTreeMap<PathBuf, SourceFile> = BTreeMap::new();
        for file in files {
            match normalize_path(&file.path) {
                Some(path) if !path.as_os_str().is_empty() => {
                    unique.entry(path.clone()).or_insert_with(|| SourceFile {
                        path,
                        ..file.clone()
                    });
                }
                _ => failures.push(FileFailure::new(
                    &file.path,
                    FailureKind::Resolution,
                    "path is outside the project root",
                )),
            }
        }

        if unique.is_empty() {
            let mut outcome = BuildOutcome::empty(start.elapsed());
            outcome.failures = failures;
            return Ok(outcome);
        }

        let mut selected: Vec<SourceFile> = unique.into_values().collect();
        let mut skipped = Vec::new();
        let truncated = selected.len() > self.options.max_graph_size;
        if truncated {
            prioritize(&mut selected);
            skipped = selected
                .split_off(self.options.max_graph_size)
                .into_iter()
                .map(|f| f.path)
                .collect();
            skipped.sort();
            warn!(
                total = selected.len() + skipped.len(),
                kept = selected.len(),
                "graph size limit exceeded, building on a truncated subset"
            );
        }

        let known: Arc<BTreeSet<PathBuf>> =
            Arc::new(selected.iter().map(|f| f.path.clone()).collect());
        let mut graph = DependencyGraph::new();
        for path in known.iter() {
            graph.add_node(path.clone());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.max_workers)
            .thread_name(|i| format!("graph-worker-{i}"))
            .build()?;

        let (tx, rx) = crossbeam_channel::unbounded::<FileEdges>();
        let cancelled = Arc::new(AtomicBool::new(false));

        for file in selected {
            let tx = tx.clone();
            let analyzer = Arc::clone(&analyzer);
            let resolvers = Arc::clone(&self.resolvers);
            let known = Arc::clone(&known);
            let cancelled = Arc::clone(&cancelled);
            pool.spawn(move || {
                if cancelled.load(Ordering::Relaxed) {
                    return;
                }
                let result = catch_unwind(AssertUnwindSafe(|| {
                    process_file(&file, analyzer.as_ref(), &resolvers, &known)
                }))
                .unwrap_or_else(|_| {
                    FileEdges::failed(
                        file.path.clone(),
                        FileFailure::new(&file.path, FailureKind::Parse, "import analyzer panicked"),
                    )
                });
                let _ = tx.send(result);
            });
        }
        drop(tx);

        let deadline = self.options.time_budget.map(|budget| start + budget);
        let mut pending: BTreeSet<PathBuf> = known.iter().cloned().collect();
        let mut unresolved_imports = 0;
        let mut incomplete = false;

        loop {
            let received = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    rx.recv_timeout(remaining)
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(edges) => {
                    pending.remove(&edges.path);
                    unresolved_imports += edges.unresolved;
                    match edges.failure {
                        Some(failure) => {
                            warn!(path = %failure.path.display(), kind = %failure.kind, "{}", failure.message);
                            failures.push(failure);
                        }
                        None => {
                            for target in edges.targets {
                                graph.add_edge(edges.path.clone(), target);
                            }
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    cancelled.store(true, Ordering::Relaxed);
                    incomplete = true;
                    warn!(
                        unmerged = pending.len(),
                        budget = ?self.options.time_budget,
                        "build time budget exhausted, returning partial graph"
                    );
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if incomplete {
            failures.extend(pending.into_iter().map(|path| {
                FileFailure::new(path, FailureKind::Timeout, "not merged before the time budget ran out")
            }));
        }
        failures.sort_by(|a, b| a.path.cmp(&b.path));

        let outcome = BuildOutcome {
            graph: Arc::new(graph),
            truncated,
            incomplete,
            failures,
            skipped,
            unresolved_imports,
            elapsed: start.elapsed(),
        };

        info!(
            nodes = outcome.graph.node_count(),
            edges = outcome.graph.edge_count(),
            failures = outcome.failures.len(),
            unresolved = outcome.unresolved_imports,
            truncated = outcome.truncated,
            incomplete = outcome.incomplete,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "dependency graph built"
        );

        Ok(outcome)
    }
}

fn process_file(
    file: &SourceFile,
    analyzer: &dyn ImportAnalyzer,
    resolvers: &ResolverRegistry,
    known: &BTreeSet<PathBuf>,
) -> FileEdges {
    let imports = match analyzer.analyze(file) {
        Ok(imports) => imports,
        Err(failure) => return FileEdges::failed(file.path.clone(), failure),
    };

    let mut targets = BTreeSet::new();
    let mut unresolved = 0;
    for import in imports {
        let reference = if import.source == file.path {
            import
        } else {
            ImportReference {
                source: file.path.clone(),
                ..import
            }
        };

        match resolvers.resolve(&reference, file.language, known) {
            Ok(Resolution::Internal(target)) => {
                if target != file.path {
                    targets.insert(target);
                }
            }
            Ok(Resolution::External) => {
                unresolved += 1;
                debug!(
                    from_file = %file.path.display(),
                    import = %reference.module,
                    "import unresolved (likely external)"
                );
            }
            Err(message) => {
                return FileEdges::failed(
                    file.path.clone(),
                    FileFailure::new(&file.path, FailureKind::Resolution, message),
                );
            }
        }
    }

    FileEdges {
        path: file.path.clone(),
        targets,
        unresolved,
        failure: None,
    }
}
