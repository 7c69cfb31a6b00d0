//! CLI tool for fold-based training runs over a pipeline (.pipe) file.
//!
//! Usage:
//!   fold-run <pipeline.pipe> <input.data>
//!   fold-run <pipeline.pipe> <input.data> --folds 10 --chunk 500
//!
//! Prints, per fold, how many chunks and instances went to training and
//! testing, and the label counts seen on each side.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use fold_pipe::execute_folds;
use tracing_subscriber::EnvFilter;

/// Train one learner per fold over a pipeline's instances.
#[derive(Parser)]
#[command(name = "fold-run")]
struct Cli {
    /// Pipeline definition file (.pipe); must end in INSTANCE
    pipeline: PathBuf,

    /// Input data file, reopened for every pass
    input: PathBuf,

    /// Number of folds
    #[arg(short, long, default_value_t = 5)]
    folds: usize,

    /// Maximum instances per training chunk
    #[arg(short, long, default_value_t = 1000)]
    chunk: usize,

    /// Log fold progress on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "info" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

fn tally(labels: &BTreeMap<String, usize>) -> String {
    labels
        .iter()
        .map(|(label, count)| format!("{label}={count}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let pipeline_text = match fs::read_to_string(&cli.pipeline) {
        Ok(content) => content,
        Err(e) => {
            eprintln!(
                "Error reading pipeline file '{}': {e}",
                cli.pipeline.display()
            );
            process::exit(1);
        }
    };

    let outcomes = match execute_folds(&cli.input, &pipeline_text, cli.folds, cli.chunk) {
        Ok(outcomes) => outcomes,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    for outcome in &outcomes {
        println!(
            "fold {}: train {} instances in {} chunks [{}], test {} instances [{}]",
            outcome.fold,
            outcome.train.instances,
            outcome.train.chunks,
            tally(&outcome.learner.train_labels),
            outcome.test.instances,
            tally(&outcome.learner.test_labels),
        );
    }
}
