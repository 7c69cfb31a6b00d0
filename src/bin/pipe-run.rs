//! CLI tool to run pipeline (.pipe) files against input data.
//!
//! Usage:
//!   pipe-run <pipeline.pipe> <input.data>
//!   pipe-run <pipeline.pipe> <input.data> -o <output.data>
//!
//! If no output file is specified, writes to stdout. The input is streamed
//! one line at a time, so it may be larger than memory.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process;

use clap::Parser;
use instance_pipes::{
    LineSource, OnError, Source, build_pipeline, parse_commands, render_envelope, run,
};
use tracing_subscriber::EnvFilter;

/// Run a pipeline file against input data.
#[derive(Parser)]
#[command(name = "pipe-run")]
struct Cli {
    /// Pipeline definition file (.pipe)
    pipeline: String,

    /// Input data file (one record per line, or /dev/stdin)
    input: String,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    output: Option<String>,

    /// Report malformed records on stderr and keep going
    #[arg(long)]
    skip_malformed: bool,

    /// Print each record's payload at every pipe point on stderr
    #[arg(long)]
    trace: bool,

    /// Show paths and record counts on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

fn open_output(path: Option<&str>) -> io::Result<Box<dyn Write>> {
    match path {
        Some(out_path) => {
            if let Some(parent) = Path::new(out_path).parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }
            Ok(Box::new(BufWriter::new(File::create(out_path)?)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let pipeline_text = match fs::read_to_string(&cli.pipeline) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading pipeline file '{}': {e}", cli.pipeline);
            process::exit(1);
        }
    };

    let commands = match parse_commands(&pipeline_text) {
        Ok(commands) => commands,
        Err(e) => {
            eprintln!("Error in pipeline file '{}': {e}", cli.pipeline);
            process::exit(1);
        }
    };

    let source = match LineSource::open(&cli.input) {
        Ok(source) => source.numbered(),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let mut pipeline = match build_pipeline(&commands, source) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("Pipeline error: {e}");
            process::exit(1);
        }
    };

    if cli.verbose {
        eprintln!("Pipeline: {}", cli.pipeline);
        eprintln!("Input:    {}", cli.input);
        eprintln!("Output:   {}", cli.output.as_deref().unwrap_or("(stdout)"));
        eprintln!("Stages:   {}", pipeline.stage_names().join(" | "));
    }

    let mut out = match open_output(cli.output.as_deref()) {
        Ok(out) => out,
        Err(e) => {
            eprintln!("Error opening output: {e}");
            process::exit(1);
        }
    };

    if cli.trace {
        let names: Vec<String> = pipeline
            .stage_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        while pipeline.has_next() {
            match pipeline.next_traced() {
                Ok(trace) => {
                    eprintln!("{}", trace.render(&names));
                    if let Some(last) = trace.pipe_points.last()
                        && let Err(e) = writeln!(out, "{}", render_envelope(last))
                    {
                        eprintln!("Error writing output: {e}");
                        process::exit(1);
                    }
                }
                Err((trace, e)) => {
                    eprintln!("{}", trace.render(&names));
                    eprintln!("Record error: {e}");
                    if !(cli.skip_malformed && e.is_record_error()) {
                        process::exit(1);
                    }
                }
            }
        }
    } else {
        let on_error = if cli.skip_malformed {
            OnError::Skip
        } else {
            OnError::Abort
        };
        let mut write_error = None;
        let result = run(&mut pipeline, on_error, |envelope| {
            if write_error.is_none()
                && let Err(e) = writeln!(out, "{}", render_envelope(&envelope))
            {
                write_error = Some(e);
            }
        });
        if let Some(e) = write_error {
            eprintln!("Error writing output: {e}");
            process::exit(1);
        }
        match result {
            Ok(stats) => {
                for skipped in &stats.skipped {
                    eprintln!("Skipped: {skipped}");
                }
                if cli.verbose {
                    eprintln!(
                        "Records:  {} in -> {} out ({} skipped)",
                        stats.input_count,
                        stats.output_count,
                        stats.skipped.len()
                    );
                }
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                process::exit(1);
            }
        }
    }

    if let Err(e) = out.flush() {
        eprintln!("Error writing output: {e}");
        process::exit(1);
    }
}
