//! The compile-and-execute trace pipeline.

use btviz_analysis::{find_instrumentation, AnalysisError, SyntaxTree};
use btviz_core::{TraceCollector, TraceStep};

use crate::error::{CompileFailure, ExecutionFailure, TraceError};
use crate::launcher::{self, Launch};
use crate::protocol;
use crate::runtime::{SUPPORT_CRATE, SUPPORT_FILE, SUPPORT_SOURCE};
use crate::toolchain::{RustcToolchain, Toolchain};
use crate::workspace::Workspace;
use crate::PipelineOptions;

const EVENTS_FILE: &str = "events.jsonl";

/// Compiles and runs `source` with the host `rustc`, returning every step
/// its `capture_step!` calls recorded.
pub fn run_trace(source: &str, options: &PipelineOptions) -> Result<Vec<TraceStep>, TraceError> {
    let toolchain = RustcToolchain::new(&options.rustc, &options.edition);
    run_trace_with(&toolchain, source, options)
}

/// [`run_trace`] with an explicit toolchain.
///
/// Steps recorded before a failure are discarded with the collector. The
/// workspace, compiled artifacts and child process are released on every
/// path when their guards drop.
pub fn run_trace_with(
    toolchain: &dyn Toolchain,
    source: &str,
    options: &PipelineOptions,
) -> Result<Vec<TraceStep>, TraceError> {
    let tree = SyntaxTree::parse(source).map_err(syntax_failure)?;
    let unit = tree.unit_name().ok_or(TraceError::NoDeclaration)?;

    let span = tracing::info_span!("run_trace", unit = %unit);
    let _entered = span.enter();

    let sites = find_instrumentation(&tree);
    if sites.is_empty() {
        tracing::warn!("snippet has no capture_step! calls; the trace will be empty");
    } else {
        tracing::debug!(sites = sites.len(), "instrumentation found");
    }

    let mut collector = TraceCollector::new().with_signatures(tree.signature_index());
    let program = with_entry_point(source, &tree, &unit);

    let mut workspace = Workspace::acquire(options.work_root.as_deref())
        .map_err(|e| ExecutionFailure::io("creating workspace", e))?;

    let source_path = workspace
        .write(&format!("{unit}.rs"), &program)
        .map_err(|e| ExecutionFailure::io("writing snippet", e))?;
    let support_path = workspace
        .write(SUPPORT_FILE, SUPPORT_SOURCE)
        .map_err(|e| ExecutionFailure::io("writing support crate", e))?;

    let support_dir = workspace.path().to_path_buf();
    workspace.track(support_dir.join(format!("lib{SUPPORT_CRATE}.rlib")));
    let support = toolchain.compile_library(&support_path, SUPPORT_CRATE, &support_dir)?;

    let binary_path = workspace.join(&format!("{unit}{}", std::env::consts::EXE_SUFFIX));
    workspace.track(binary_path.clone());
    let binary = toolchain.compile_binary(
        &source_path,
        &[(SUPPORT_CRATE.to_string(), support.path.clone())],
        &binary_path,
    )?;
    for diag in &binary.diagnostics {
        tracing::debug!(level = %diag.level, line = ?diag.line, "{}", diag.message);
    }

    let events = workspace.join(EVENTS_FILE);
    workspace.track(events.clone());
    launcher::run(
        &mut workspace,
        &Launch {
            binary: &binary.path,
            events: &events,
            timeout: options.timeout,
            capture_backtraces: options.capture_backtraces,
        },
    )?;

    protocol::ingest_file(&events, &mut collector)?;
    tracing::info!(steps = collector.len(), "trace complete");
    Ok(collector.into_steps())
}

/// A snippet that cannot be parsed gets the same treatment as one that
/// does not compile.
fn syntax_failure(err: AnalysisError) -> TraceError {
    match err {
        AnalysisError::Syntax { message, line, column } => {
            CompileFailure::single(message, Some(line), Some(column)).into()
        }
        other => CompileFailure::single(other.to_string(), None, None).into(),
    }
}

/// Appends `fn main` forwarding to `<unit>::main()` when the snippet only
/// declares its entry point on the unit.
fn with_entry_point(source: &str, tree: &SyntaxTree, unit: &str) -> String {
    if !tree.has_main() && tree.unit_has_main(unit) {
        format!("{source}\n\nfn main() {{\n    {unit}::main();\n}}\n")
    } else {
        source.to_string()
    }
}
