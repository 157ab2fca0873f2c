use abyss_graph::GraphConfig;
use abyss_graph::runner::{Command, Output, run};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Dependency graph, centrality and change-impact analysis", long_about = None)]
struct Args {
    /// Project root to analyze
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Configuration file (defaults to ./abyss-graph.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Add ignore pattern (glob)
    #[arg(long, global = true)]
    ignore: Vec<String>,

    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Node, edge and cycle counts
    Stats,
    /// Files imported by FILE
    Deps { file: PathBuf },
    /// Files importing FILE
    Dependents { file: PathBuf },
    /// Circular dependency chains
    Cycles,
    /// Most central files
    Rank {
        /// degree, pagerank or eigenvector
        #[arg(short, long)]
        algorithm: Option<String>,
        #[arg(short, long, default_value_t = 20)]
        top: usize,
    },
    /// What breaks if TARGETS change
    Impact {
        #[arg(required = true)]
        targets: Vec<PathBuf>,
        #[arg(long)]
        max_depth: Option<usize>,
        #[arg(long)]
        max_affected: Option<usize>,
    },
    /// Files with dependencies before their dependents
    Order,
}

impl From<CliCommand> for Command {
    fn from(command: CliCommand) -> Self {
        match command {
            CliCommand::Stats => Command::Stats,
            CliCommand::Deps { file } => Command::Deps(file),
            CliCommand::Dependents { file } => Command::Dependents(file),
            CliCommand::Cycles => Command::Cycles,
            CliCommand::Rank { algorithm, top } => Command::Rank { algorithm, top },
            CliCommand::Impact {
                targets,
                max_depth,
                max_affected,
            } => Command::Impact {
                targets,
                max_depth,
                max_affected,
            },
            CliCommand::Order => Command::Order,
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "abyss_graph=warn",
        1 => "abyss_graph=info",
        2 => "abyss_graph=debug",
        _ => "abyss_graph=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    // 1. Load from file or default
    let mut config = match &args.config {
        Some(path) => GraphConfig::load_from_path(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => GraphConfig::load_from_file()?.unwrap_or_default(),
    };

    // 2. CLI ignores add to config ignores
    config.ignore_patterns.extend(args.ignore);

    let output = if args.json { Output::Json } else { Output::Text };
    let rendered = run(&args.path, config, &args.command.into(), output)?;
    print!("{rendered}");
    if !rendered.ends_with('\n') {
        println!();
    }

    Ok(())
}
