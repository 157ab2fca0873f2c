use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::GraphConfig;
use crate::error::FileFailure;
use crate::fs::discover_sources;
use crate::session::AnalysisSession;
use crate::utils::analysis::builder::BuildOutcome;
use crate::utils::analysis::dependencies::{ImportAnalyzer, TreeSitterImportAnalyzer};
use crate::utils::analysis::graph::GraphStatistics;
use crate::utils::analysis::rank::priority_score;

/// A query against the project graph
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Stats,
    Deps(PathBuf),
    Dependents(PathBuf),
    Cycles,
    Rank {
        algorithm: Option<String>,
        top: usize,
    },
    Impact {
        targets: Vec<PathBuf>,
        max_depth: Option<usize>,
        max_affected: Option<usize>,
    },
    Order,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Output {
    #[default]
    Text,
    Json,
}

#[derive(Serialize)]
struct StatsReport<'a> {
    statistics: GraphStatistics,
    truncated: bool,
    incomplete: bool,
    skipped: usize,
    unresolved_imports: usize,
    failures: &'a [FileFailure],
}

#[derive(Serialize)]
struct RankedFile<'a> {
    path: &'a Path,
    score: f64,
}

/// Scans `root`, builds its dependency graph and answers `command`.
///
/// Returns the rendered output; printing is left to the caller.
pub fn run(root: &Path, config: GraphConfig, command: &Command, output: Output) -> Result<String> {
    let session = AnalysisSession::new(config).context("Invalid configuration")?;

    let files = discover_sources(root, &session.config().ignore_patterns)
        .with_context(|| format!("Failed to scan {}", root.display()))?;
    info!(files = files.len(), root = %root.display(), "discovered source files");

    let analyzer: Arc<dyn ImportAnalyzer> = Arc::new(TreeSitterImportAnalyzer::new(root));
    let outcome = session
        .build_dependency_graph(&files, analyzer)
        .context("Failed to build dependency graph")?;
    report_partial(&outcome);

    render(&session, &outcome, command, output)
}

fn report_partial(outcome: &BuildOutcome) {
    if outcome.truncated {
        warn!(
            skipped = outcome.skipped.len(),
            "graph truncated to the highest-priority files"
        );
    }
    if outcome.incomplete {
        warn!("graph is incomplete: the build time budget ran out");
    }
}

fn render(session: &AnalysisSession, outcome: &BuildOutcome, command: &Command, output: Output) -> Result<String> {
    let graph = outcome.graph.as_ref();
    let json = output == Output::Json;
    let mut out = String::new();

    match command {
        Command::Stats => {
            let statistics = session.get_graph_statistics(graph)?;
            if json {
                out = serde_json::to_string_pretty(&StatsReport {
                    statistics,
                    truncated: outcome.truncated,
                    incomplete: outcome.incomplete,
                    skipped: outcome.skipped.len(),
                    unresolved_imports: outcome.unresolved_imports,
                    failures: &outcome.failures,
                })?;
            } else {
                write!(out, "{statistics}")?;
                if outcome.truncated {
                    writeln!(out, "Truncated:      {} files skipped", outcome.skipped.len())?;
                }
                if outcome.incomplete {
                    writeln!(out, "Incomplete:     build time budget exhausted")?;
                }
                if !outcome.failures.is_empty() {
                    writeln!(out)?;
                    writeln!(out, "Failures:")?;
                    for failure in &outcome.failures {
                        writeln!(out, "  {failure}")?;
                    }
                }
            }
        }
        Command::Deps(file) | Command::Dependents(file) => {
            let paths = if matches!(command, Command::Deps(_)) {
                session.get_dependencies(graph, file)
            } else {
                session.get_dependents(graph, file)
            };
            if json {
                out = serde_json::to_string_pretty(paths)?;
            } else {
                for path in paths {
                    writeln!(out, "{}", path.display())?;
                }
            }
        }
        Command::Cycles => {
            let cycles = session.find_circular_dependencies(graph)?;
            if json {
                out = serde_json::to_string_pretty(&cycles)?;
            } else if cycles.is_empty() {
                writeln!(out, "No circular dependencies found.")?;
            } else {
                writeln!(out, "Found {} circular dependencies:", cycles.len())?;
                for cycle in &cycles {
                    writeln!(out, "  {cycle}")?;
                }
            }
        }
        Command::Rank { algorithm, top } => {
            let name = match algorithm {
                Some(name) => name.clone(),
                None => session.config().default_algorithm()?.to_string(),
            };
            let result = session.get_centrality_scores(graph, &name)?;
            let ranked: Vec<RankedFile<'_>> = result
                .top(*top)
                .into_iter()
                .map(|(path, score)| RankedFile { path, score })
                .collect();
            if json {
                out = serde_json::to_string_pretty(&ranked)?;
            } else {
                writeln!(out, "Top {} files by {}:", ranked.len(), result.algorithm)?;
                for (i, file) in ranked.iter().enumerate() {
                    writeln!(out, "{:>4}. {:.6}  {}", i + 1, file.score, file.path.display())?;
                }
                if !result.converged {
                    writeln!(out, "(did not converge after {} iterations)", result.iterations)?;
                }
            }
        }
        Command::Impact {
            targets,
            max_depth,
            max_affected,
        } => {
            let mut options = session.config().impact;
            if let Some(depth) = max_depth {
                options.max_depth = *depth;
            }
            if let Some(affected) = max_affected {
                options.max_affected = *affected;
            }
            let report = session.analyze_change_impact(graph, targets, Some(options))?;
            if json {
                out = serde_json::to_string_pretty(&report)?;
            } else {
                write!(out, "{report}")?;
            }
        }
        Command::Order => {
            let order = graph.sort_topologically(|a, b| {
                priority_score(b).cmp(&priority_score(a)).then_with(|| a.cmp(b))
            });
            if json {
                out = serde_json::to_string_pretty(&order)?;
            } else {
                for path in &order {
                    writeln!(out, "{}", path.display())?;
                }
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn python_repo() -> Result<TempDir> {
        let dir = TempDir::new()?;
        let root = dir.path();
        fs::write(root.join("app.py"), "import service\n")?;
        fs::write(root.join("service.py"), "from models import User\nimport os\n")?;
        fs::write(root.join("models.py"), "import json\n")?;
        Ok(dir)
    }

    #[test]
    fn test_run_deps_text() -> Result<()> {
        let dir = python_repo()?;
        let out = run(
            dir.path(),
            GraphConfig::default(),
            &Command::Deps(PathBuf::from("app.py")),
            Output::Text,
        )?;
        assert_eq!(out.trim(), "service.py");
        Ok(())
    }

    #[test]
    fn test_run_order_puts_dependencies_first() -> Result<()> {
        let dir = python_repo()?;
        let out = run(dir.path(), GraphConfig::default(), &Command::Order, Output::Json)?;
        let order: Vec<PathBuf> = serde_json::from_str(&out)?;
        let pos = |name: &str| order.iter().position(|p| p == Path::new(name));
        assert!(pos("models.py") < pos("service.py"));
        assert!(pos("service.py") < pos("app.py"));
        Ok(())
    }

    #[test]
    fn test_run_impact_json() -> Result<()> {
        let dir = python_repo()?;
        let out = run(
            dir.path(),
            GraphConfig::default(),
            &Command::Impact {
                targets: vec![PathBuf::from("models.py"), PathBuf::from("gone.py")],
                max_depth: Some(1),
                max_affected: None,
            },
            Output::Json,
        )?;
        let value: serde_json::Value = serde_json::from_str(&out)?;
        assert_eq!(value["targets"][0]["status"], "analyzed");
        assert_eq!(value["targets"][0]["transitive_affected"][0], "service.py");
        assert_eq!(value["targets"][0]["bounded"], true);
        assert_eq!(value["targets"][1]["status"], "not_found");
        Ok(())
    }

    #[test]
    fn test_run_rank_rejects_unknown_algorithm() -> Result<()> {
        let dir = python_repo()?;
        let err = run(
            dir.path(),
            GraphConfig::default(),
            &Command::Rank {
                algorithm: Some("closeness".into()),
                top: 5,
            },
            Output::Text,
        )
        .unwrap_err();
        assert!(err.to_string().contains("closeness"));
        Ok(())
    }
}
