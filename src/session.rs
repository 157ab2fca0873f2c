//! Analysis session: the entry points the CLI layer calls.
//!
//! One session owns its graph cache, centrality cache and test heuristic, so
//! nothing leaks between sessions. Every consumer in a session reads the same
//! published graph instance.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::GraphConfig;
use crate::core::{SourceFile, normalize_path};
use crate::error::{Feature, GraphError, Result};
use crate::utils::analysis::builder::{BuildOptions, BuildOutcome, GraphBuilder};
use crate::utils::analysis::centrality::{Algorithm, CentralityCache, CentralityResult};
use crate::utils::analysis::cycles::{Cycle, find_cycles};
use crate::utils::analysis::dependencies::ImportAnalyzer;
use crate::utils::analysis::graph::{DependencyGraph, GraphStatistics};
use crate::utils::analysis::impact::{ImpactAnalyzer, ImpactOptions, ImpactReport, PatternTestHeuristic, TestHeuristic};
use crate::utils::analysis::resolve::ResolverRegistry;
use crate::utils::cache::GraphCache;

pub struct AnalysisSession {
    config: GraphConfig,
    allowed: Vec<Algorithm>,
    builder: GraphBuilder,
    graphs: GraphCache,
    centrality: CentralityCache,
    tests: Box<dyn TestHeuristic>,
}

impl std::fmt::Debug for AnalysisSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisSession")
            .field("config", &self.config)
            .field("graphs", &self.graphs)
            .field("centrality", &self.centrality)
            .finish_non_exhaustive()
    }
}

impl AnalysisSession {
    /// Creates a session with the built-in language resolvers.
    pub fn new(config: GraphConfig) -> Result<Self> {
        let resolvers = ResolverRegistry::with_defaults(config.go_module.clone());
        Self::with_resolvers(config, resolvers)
    }

    pub fn with_resolvers(config: GraphConfig, resolvers: ResolverRegistry) -> Result<Self> {
        config.validate()?;
        let allowed = config.algorithms()?;
        let tests: Box<dyn TestHeuristic> = if config.test_patterns.is_empty() {
            Box::new(PatternTestHeuristic::default())
        } else {
            Box::new(PatternTestHeuristic::new(&config.test_patterns)?)
        };

        Ok(Self {
            allowed,
            builder: GraphBuilder::new(Arc::new(resolvers), BuildOptions::from_config(&config)),
            graphs: GraphCache::new(config.cache_graphs),
            centrality: CentralityCache::new(config.centrality, config.max_centrality_cache_size),
            tests,
            config,
        })
    }

    /// Replaces the test-path heuristic used for suggested tests.
    pub fn with_test_heuristic(mut self, heuristic: impl TestHeuristic + 'static) -> Self {
        self.tests = Box::new(heuristic);
        self
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn centrality_cache(&self) -> &CentralityCache {
        &self.centrality
    }

    pub fn graph_cache(&self) -> &GraphCache {
        &self.graphs
    }

    fn require(&self, feature: Feature) -> Result<()> {
        let enabled = match feature {
            Feature::CallGraph => self.config.enable_call_graph,
            Feature::ImpactAnalysis => self.config.enable_impact_analysis,
        };
        if enabled {
            Ok(())
        } else {
            Err(GraphError::FeatureDisabled(feature))
        }
    }

    /// Builds (or reuses) the graph for the current file set.
    pub fn build_dependency_graph(
        &self,
        files: &[SourceFile],
        analyzer: Arc<dyn ImportAnalyzer>,
    ) -> Result<Arc<BuildOutcome>> {
        self.require(Feature::CallGraph)?;
        self.graphs.get_or_build(files, analyzer, &self.builder)
    }

    /// Graph from the latest build, if any
    pub fn current_graph(&self) -> Option<Arc<DependencyGraph>> {
        self.graphs.current().map(|outcome| Arc::clone(&outcome.graph))
    }

    /// Forgets the cached graph and every centrality result.
    pub fn invalidate(&self) {
        self.graphs.invalidate();
        self.centrality.clear();
        debug!("analysis session invalidated");
    }

    pub fn get_dependencies<'g>(&self, graph: &'g DependencyGraph, file: &Path) -> &'g BTreeSet<PathBuf> {
        match normalize_path(file) {
            Some(path) => graph.dependencies(&path),
            None => graph.dependencies(file),
        }
    }

    pub fn get_dependents<'g>(&self, graph: &'g DependencyGraph, file: &Path) -> &'g BTreeSet<PathBuf> {
        match normalize_path(file) {
            Some(path) => graph.dependents(&path),
            None => graph.dependents(file),
        }
    }

    pub fn find_circular_dependencies(&self, graph: &DependencyGraph) -> Result<Vec<Cycle>> {
        self.require(Feature::CallGraph)?;
        Ok(find_cycles(graph))
    }

    pub fn get_graph_statistics(&self, graph: &DependencyGraph) -> Result<GraphStatistics> {
        self.require(Feature::CallGraph)?;
        Ok(graph.statistics())
    }

    /// Centrality scores by algorithm name.
    pub fn get_centrality_scores(&self, graph: &DependencyGraph, algorithm: &str) -> Result<Arc<CentralityResult>> {
        self.require(Feature::CallGraph)?;
        let algorithm: Algorithm = algorithm.parse()?;
        self.centrality_for(graph, algorithm)
    }

    /// Centrality scores for an allowed algorithm, cached per graph version.
    pub fn centrality_for(&self, graph: &DependencyGraph, algorithm: Algorithm) -> Result<Arc<CentralityResult>> {
        self.require(Feature::CallGraph)?;
        if !self.allowed.contains(&algorithm) {
            return Err(GraphError::AlgorithmNotAllowed(algorithm));
        }
        Ok(self.centrality.get_or_compute(graph, algorithm))
    }

    /// Impact of changing `targets`, with risk scored by the first allowed
    /// algorithm. `None` uses the configured impact options.
    pub fn analyze_change_impact(
        &self,
        graph: &DependencyGraph,
        targets: &[PathBuf],
        options: Option<ImpactOptions>,
    ) -> Result<ImpactReport> {
        self.require(Feature::ImpactAnalysis)?;
        let options = options.unwrap_or(self.config.impact);
        options.validate()?;

        let algorithm = self.allowed.first().copied().ok_or_else(|| {
            GraphError::Configuration("no centrality algorithm configured".into())
        })?;
        let centrality = self.centrality.get_or_compute(graph, algorithm);
        let analyzer = ImpactAnalyzer::new(graph, &centrality, self.tests.as_ref(), options)?;
        Ok(analyzer.analyze(targets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::core::ImportReference;

    fn project(edges: &[(&str, &str)]) -> (Vec<SourceFile>, Arc<dyn ImportAnalyzer>) {
        let mut names = BTreeSet::new();
        let mut imports: HashMap<PathBuf, Vec<ImportReference>> = HashMap::new();
        for (from, to) in edges {
            names.insert(*from);
            names.insert(*to);
            imports
                .entry(PathBuf::from(from))
                .or_default()
                .push(ImportReference::new(*from, to.trim_end_matches(".py")));
        }
        let files = names.into_iter().map(SourceFile::new).collect();
        let analyzer: Arc<dyn ImportAnalyzer> = Arc::new(imports);
        (files, analyzer)
    }

    #[test]
    fn test_session_end_to_end() -> anyhow::Result<()> {
        let session = AnalysisSession::new(GraphConfig::default())?;
        let (files, analyzer) = project(&[("a.py", "b.py"), ("b.py", "c.py")]);

        let outcome = session.build_dependency_graph(&files, analyzer)?;
        let graph = &outcome.graph;

        assert_eq!(
            session.get_dependencies(graph, Path::new("a.py")),
            &BTreeSet::from([PathBuf::from("b.py")])
        );
        assert_eq!(
            session.get_dependents(graph, Path::new("./c.py")),
            &BTreeSet::from([PathBuf::from("b.py")])
        );
        assert!(session.find_circular_dependencies(graph)?.is_empty());

        let stats = session.get_graph_statistics(graph)?;
        assert_eq!(stats.total_nodes, 3);
        assert_eq!(stats.total_edges, 2);

        let report = session.analyze_change_impact(
            graph,
            &[PathBuf::from("c.py")],
            Some(ImpactOptions {
                max_depth: 2,
                ..Default::default()
            }),
        )?;
        let c = report.targets[0].impact().unwrap();
        assert_eq!(c.transitive_affected, vec![PathBuf::from("a.py"), PathBuf::from("b.py")]);
        assert_eq!(report.graph_version, graph.version());
        assert_eq!(report.algorithm, Algorithm::PageRank);

        let current = session.current_graph().unwrap();
        assert!(Arc::ptr_eq(&current, graph));
        Ok(())
    }

    #[test]
    fn test_centrality_cached_until_rebuild() -> anyhow::Result<()> {
        let session = AnalysisSession::new(GraphConfig::default())?;
        let (files, analyzer) = project(&[("a.py", "b.py")]);
        let outcome = session.build_dependency_graph(&files, Arc::clone(&analyzer))?;

        let first = session.get_centrality_scores(&outcome.graph, "pagerank")?;
        let second = session.get_centrality_scores(&outcome.graph, "PageRank")?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(session.centrality_cache().computations(), 1);

        session.invalidate();
        let rebuilt = session.build_dependency_graph(&files, analyzer)?;
        let third = session.get_centrality_scores(&rebuilt.graph, "pagerank")?;
        assert_eq!(third.version, rebuilt.graph.version());
        assert_eq!(session.centrality_cache().computations(), 2);
        Ok(())
    }

    #[test]
    fn test_feature_gates() -> anyhow::Result<()> {
        let session = AnalysisSession::new(GraphConfig {
            enable_call_graph: false,
            enable_impact_analysis: false,
            ..Default::default()
        })?;
        let (files, analyzer) = project(&[("a.py", "b.py")]);
        let graph = DependencyGraph::new();

        let err = session.build_dependency_graph(&files, analyzer).unwrap_err();
        assert!(matches!(err, GraphError::FeatureDisabled(Feature::CallGraph)));
        assert!(matches!(
            session.find_circular_dependencies(&graph),
            Err(GraphError::FeatureDisabled(Feature::CallGraph))
        ));
        assert!(matches!(
            session.get_centrality_scores(&graph, "degree"),
            Err(GraphError::FeatureDisabled(Feature::CallGraph))
        ));
        assert!(matches!(
            session.analyze_change_impact(&graph, &[], None),
            Err(GraphError::FeatureDisabled(Feature::ImpactAnalysis))
        ));
        Ok(())
    }

    #[test]
    fn test_algorithm_allow_list() -> anyhow::Result<()> {
        let session = AnalysisSession::new(GraphConfig {
            centrality_algorithms: vec!["degree".into()],
            ..Default::default()
        })?;
        let graph = DependencyGraph::new();

        let err = session.get_centrality_scores(&graph, "pagerank").unwrap_err();
        assert!(matches!(err, GraphError::AlgorithmNotAllowed(Algorithm::PageRank)));
        assert!(err.is_configuration());

        let err = session.get_centrality_scores(&graph, "betweenness").unwrap_err();
        assert!(matches!(err, GraphError::UnknownAlgorithm(_)));

        let report = session.analyze_change_impact(&graph, &[PathBuf::from("x.py")], None)?;
        assert_eq!(report.algorithm, Algorithm::Degree);
        assert_eq!(report.not_found(), vec![Path::new("x.py")]);
        Ok(())
    }

    #[test]
    fn test_invalid_impact_options_rejected() -> anyhow::Result<()> {
        let session = AnalysisSession::new(GraphConfig::default())?;
        let graph = DependencyGraph::new();
        let err = session
            .analyze_change_impact(
                &graph,
                &[],
                Some(ImpactOptions {
                    max_affected: 0,
                    ..Default::default()
                }),
            )
            .unwrap_err();
        assert!(err.is_configuration());
        Ok(())
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = AnalysisSession::new(GraphConfig {
            max_graph_size: 0,
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.is_configuration());
    }
}
