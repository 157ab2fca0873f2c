use abyss_graph::fs::discover_sources;
use abyss_graph::utils::analysis::{ImportAnalyzer, TreeSitterImportAnalyzer};
use abyss_graph::{AnalysisSession, GraphConfig, ImpactOptions, SourceFile};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn mixed_repo() -> anyhow::Result<TempDir> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();

    fs::create_dir_all(root.join("src"))?;
    fs::write(
        root.join("src/main.rs"),
        "mod graph;\nmod util;\nuse crate::graph::Graph;\nuse std::collections::HashMap;\nfn main() {}\n",
    )?;
    fs::write(root.join("src/graph.rs"), "use crate::util::helper;\npub struct Graph;\n")?;
    fs::write(root.join("src/util.rs"), "use super::graph::Graph;\npub fn helper() {}\n")?;

    fs::create_dir_all(root.join("web/lib"))?;
    fs::write(root.join("web/app.ts"), "import { x } from './lib';\nimport React from 'react';\n")?;
    fs::write(root.join("web/lib/index.ts"), "export const x = 1;\n")?;

    fs::create_dir_all(root.join("pkg"))?;
    fs::create_dir_all(root.join("tests"))?;
    fs::write(root.join("pkg/__init__.py"), "")?;
    fs::write(root.join("pkg/core.py"), "from .helpers import assist\nimport os\n")?;
    fs::write(root.join("pkg/helpers.py"), "def assist():\n    pass\n")?;
    fs::write(root.join("tests/test_core.py"), "from pkg.core import run\n")?;

    // Not a source file
    fs::write(root.join("README.md"), "# fixture\n")?;

    Ok(temp_dir)
}

fn paths(items: &[&str]) -> BTreeSet<PathBuf> {
    items.iter().map(PathBuf::from).collect()
}

#[test]
fn test_end_to_end_mixed_languages() -> anyhow::Result<()> {
    let temp_dir = mixed_repo()?;
    let root = temp_dir.path();

    let session = AnalysisSession::new(GraphConfig::default())?;
    let files = discover_sources(root, &session.config().ignore_patterns)?;
    assert_eq!(files.len(), 9);

    let analyzer: Arc<dyn ImportAnalyzer> = Arc::new(TreeSitterImportAnalyzer::new(root));
    let outcome = session.build_dependency_graph(&files, analyzer)?;
    assert!(outcome.is_complete());
    assert!(!outcome.truncated);
    assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);

    let graph = &outcome.graph;
    assert_eq!(
        session.get_dependencies(graph, Path::new("src/main.rs")),
        &paths(&["src/graph.rs", "src/util.rs"])
    );
    assert_eq!(
        session.get_dependencies(graph, Path::new("web/app.ts")),
        &paths(&["web/lib/index.ts"])
    );
    assert_eq!(
        session.get_dependents(graph, Path::new("pkg/core.py")),
        &paths(&["tests/test_core.py"])
    );
    assert!(outcome.unresolved_imports >= 3); // std, react, os

    let cycles = session.find_circular_dependencies(graph)?;
    assert_eq!(cycles.len(), 1);
    assert_eq!(
        cycles[0].nodes(),
        &[PathBuf::from("src/graph.rs"), PathBuf::from("src/util.rs")]
    );

    let report = session.analyze_change_impact(graph, &[PathBuf::from("pkg/helpers.py")], None)?;
    let helpers = report.targets[0].impact().expect("helpers is in the graph");
    assert_eq!(
        helpers.transitive_affected,
        vec![PathBuf::from("pkg/core.py"), PathBuf::from("tests/test_core.py")]
    );
    assert_eq!(helpers.suggested_tests, vec![PathBuf::from("tests/test_core.py")]);

    Ok(())
}

#[test]
fn test_rebuild_only_when_files_change() -> anyhow::Result<()> {
    let temp_dir = mixed_repo()?;
    let root = temp_dir.path();

    let session = AnalysisSession::new(GraphConfig::default())?;
    let analyzer: Arc<dyn ImportAnalyzer> = Arc::new(TreeSitterImportAnalyzer::new(root));

    let files = discover_sources(root, &[])?;
    let first = session.build_dependency_graph(&files, Arc::clone(&analyzer))?;
    let again = session.build_dependency_graph(&files, Arc::clone(&analyzer))?;
    assert!(Arc::ptr_eq(&first, &again));

    let scores = session.get_centrality_scores(&first.graph, "pagerank")?;
    assert_eq!(scores.version, first.graph.version());

    fs::write(root.join("pkg/extra.py"), "from pkg import helpers\n")?;
    let files = discover_sources(root, &[])?;
    let second = session.build_dependency_graph(&files, analyzer)?;

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(second.graph.version() > first.graph.version());
    assert!(second.graph.contains(Path::new("pkg/extra.py")));
    // The earlier snapshot is untouched
    assert!(!first.graph.contains(Path::new("pkg/extra.py")));
    assert!(scores.is_stale_for(&second.graph));

    Ok(())
}

#[test]
fn test_truncated_build_keeps_entry_points() -> anyhow::Result<()> {
    let temp_dir = mixed_repo()?;
    let root = temp_dir.path();

    let config = GraphConfig {
        max_graph_size: 2,
        ..Default::default()
    };
    let session = AnalysisSession::new(config)?;
    let files = discover_sources(root, &[])?;
    let analyzer: Arc<dyn ImportAnalyzer> = Arc::new(TreeSitterImportAnalyzer::new(root));
    let outcome = session.build_dependency_graph(&files, analyzer)?;

    assert!(outcome.truncated);
    assert_eq!(outcome.graph.node_count(), 2);
    assert_eq!(outcome.skipped.len(), files.len() - 2);
    assert!(outcome.graph.contains(Path::new("src/main.rs")));
    Ok(())
}

#[test]
fn test_impact_with_custom_bounds() -> anyhow::Result<()> {
    let temp_dir = mixed_repo()?;
    let root = temp_dir.path();

    let session = AnalysisSession::new(GraphConfig::default())?;
    let files: Vec<SourceFile> = discover_sources(root, &[])?;
    let analyzer: Arc<dyn ImportAnalyzer> = Arc::new(TreeSitterImportAnalyzer::new(root));
    let outcome = session.build_dependency_graph(&files, analyzer)?;

    let options = ImpactOptions {
        max_depth: 1,
        ..Default::default()
    };
    let report = session.analyze_change_impact(
        &outcome.graph,
        &[PathBuf::from("pkg/helpers.py"), PathBuf::from("missing.py")],
        Some(options),
    )?;

    let helpers = report.targets[0].impact().expect("helpers is in the graph");
    assert_eq!(helpers.transitive_affected, vec![PathBuf::from("pkg/core.py")]);
    assert!(helpers.bounded);
    assert_eq!(report.not_found(), vec![Path::new("missing.py")]);
    Ok(())
}
