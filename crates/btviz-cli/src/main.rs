//! Backtracking visualizer CLI.
//!
//! Provides the `btviz` binary. `graph` prints the static recursion graph of
//! a source file as JSON or Graphviz DOT; `trace` runs an instrumented file
//! and prints its steps as JSON.
//!
//! Uses the same library calls as the HTTP server endpoints, so both entry
//! points agree on every result.

use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use btviz_analysis::{build_static_graph, static_trace, AnalysisError, GraphOptions};
use btviz_exec::{run_trace, PipelineOptions, TraceError};

/// Backtracking visualizer tools.
#[derive(Parser)]
#[command(name = "btviz", about = "Backtracking visualizer tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the static recursion graph of a backtracking routine.
    Graph {
        /// Rust source file.
        file: PathBuf,

        /// Unrolling depth, clamped to 1..=10.
        #[arg(short, long, default_value_t = btviz_analysis::builder::DEFAULT_MAX_DEPTH)]
        max_depth: usize,

        /// Print Graphviz DOT instead of JSON.
        #[arg(long)]
        dot: bool,
    },

    /// Record the steps of an instrumented program.
    Trace {
        /// Rust source file using `capture_step!`.
        file: PathBuf,

        /// Read the `capture_step!` calls from the source without running it.
        #[arg(long = "static")]
        static_only: bool,

        /// Kill the program after this many milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Graph { file, max_depth, dot } => run_graph(&file, max_depth, dot),
        Commands::Trace {
            file,
            static_only,
            timeout_ms,
        } => run_trace_command(&file, static_only, timeout_ms),
    };
    process::exit(exit_code);
}

/// Execute the graph subcommand.
///
/// Returns exit code: 0 = success, 1 = analysis error, 3 = I/O error.
fn run_graph(file: &Path, max_depth: usize, dot: bool) -> i32 {
    let source = match read_source(file) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let options = GraphOptions::with_max_depth(max_depth);
    match build_static_graph(&source, options) {
        Ok(graph) if dot => {
            print!("{}", graph.to_dot());
            0
        }
        Ok(graph) => print_json(&graph),
        Err(e) => report_analysis(file, &e),
    }
}

/// Execute the trace subcommand.
///
/// Returns exit code: 0 = success, 1 = analysis, compile or execution
/// error, 3 = I/O error.
fn run_trace_command(file: &Path, static_only: bool, timeout_ms: Option<u64>) -> i32 {
    let source = match read_source(file) {
        Ok(s) => s,
        Err(code) => return code,
    };

    if static_only {
        return match static_trace(&source) {
            Ok(steps) => print_json(&steps),
            Err(e) => report_analysis(file, &e),
        };
    }

    let mut options = PipelineOptions::from_env();
    if let Some(ms) = timeout_ms.filter(|ms| *ms > 0) {
        options.timeout = Some(Duration::from_millis(ms));
    }

    match run_trace(&source, &options) {
        Ok(steps) => print_json(&steps),
        Err(TraceError::NoDeclaration) => {
            eprintln!("Error: {}", TraceError::NoDeclaration);
            1
        }
        Err(TraceError::Compile(failure)) => {
            eprintln!("Compilation failed with {} error(s):", failure.errors().count());
            eprintln!("{failure}");
            1
        }
        Err(TraceError::Execution(failure)) => {
            eprintln!("Execution error: {failure}");
            if !failure.stack.is_empty() {
                eprintln!("{}", failure.stack.trim_end());
            }
            1
        }
    }
}

fn read_source(file: &Path) -> Result<String, i32> {
    std::fs::read_to_string(file).map_err(|e| {
        eprintln!("Error: failed to read '{}': {}", file.display(), e);
        3
    })
}

fn report_analysis(file: &Path, err: &AnalysisError) -> i32 {
    match err {
        AnalysisError::Syntax { line, column, .. } => {
            eprintln!("{}:{}:{}: {}", file.display(), line, column, err);
        }
        other => eprintln!("Error: {other}"),
    }
    1
}

/// Print a value as pretty JSON to stdout for machine-readable output.
fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(e) => {
            eprintln!("Error: failed to serialize result: {e}");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn graph_defaults_to_json_at_default_depth() {
        let cli = Cli::try_parse_from(["btviz", "graph", "solver.rs"]).unwrap();
        match cli.command {
            Commands::Graph { file, max_depth, dot } => {
                assert_eq!(file, PathBuf::from("solver.rs"));
                assert_eq!(max_depth, btviz_analysis::builder::DEFAULT_MAX_DEPTH);
                assert!(!dot);
            }
            _ => panic!("expected graph"),
        }
    }

    #[test]
    fn trace_flags() {
        let cli = Cli::try_parse_from(["btviz", "trace", "s.rs", "--static", "--timeout-ms", "250"]).unwrap();
        match cli.command {
            Commands::Trace {
                static_only,
                timeout_ms,
                ..
            } => {
                assert!(static_only);
                assert_eq!(timeout_ms, Some(250));
            }
            _ => panic!("expected trace"),
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert_eq!(run_graph(Path::new("/nonexistent/solver.rs"), 3, false), 3);
        assert_eq!(run_trace_command(Path::new("/nonexistent/solver.rs"), true, None), 3);
    }

    #[test]
    fn analysis_failures_exit_with_one() {
        let dir = std::env::temp_dir().join(format!("btviz-cli-test-{}", process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("plain.rs");
        std::fs::write(&file, "fn main() {}\n").unwrap();
        assert_eq!(run_graph(&file, 3, false), 1);
        assert_eq!(run_trace_command(&file, true, None), 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
