use abyss_graph::fs::discover_sources;
use abyss_graph::utils::analysis::{BuildOptions, GraphBuilder, ImportAnalyzer, ResolverRegistry, TreeSitterImportAnalyzer};
use criterion::{Criterion, criterion_group, criterion_main};
use std::fs::File;
use std::hint::black_box;
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;

/// Python package where every module imports the two modules before it.
fn create_test_repo(file_count: usize) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    std::fs::create_dir_all(root.join("app")).unwrap();
    File::create(root.join("app/__init__.py")).unwrap();

    for i in 0..file_count {
        let mut content = String::from("import os\n");
        for dep in i.saturating_sub(2)..i {
            content.push_str(&format!("from app.mod_{} import value_{}\n", dep, dep));
        }
        content.push_str(&format!("\nvalue_{} = {}\n", i, i));

        let mut file = File::create(root.join("app").join(format!("mod_{}.py", i))).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    temp_dir
}

fn graph_build_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_build");
    group.sample_size(20);

    for count in [10, 100, 500] {
        let repo = create_test_repo(count);
        let files = discover_sources(repo.path(), &[]).unwrap();
        let analyzer: Arc<dyn ImportAnalyzer> = Arc::new(TreeSitterImportAnalyzer::new(repo.path()));
        let builder = GraphBuilder::new(
            Arc::new(ResolverRegistry::with_defaults(None)),
            BuildOptions {
                time_budget: None,
                ..BuildOptions::default()
            },
        );

        group.bench_function(format!("{}_files", count), |b| {
            b.iter(|| {
                let outcome = builder.build(black_box(&files), Arc::clone(&analyzer)).unwrap();
                black_box(outcome.graph.edge_count())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, graph_build_benchmark);
criterion_main!(benches);
