//! Compiler invocation.
//!
//! The pipeline talks to the compiler through [`Toolchain`]. The real
//! implementation, [`RustcToolchain`], drives the host `rustc` with
//! `--error-format=json` and decodes its diagnostic stream, so success is
//! judged from the diagnostics and the exit status together.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde::Deserialize;

use crate::error::{CompileFailure, Diagnostic, ExecutionFailure, FailureKind, TraceError};

/// Crate name the snippet binary is compiled under.
pub const SNIPPET_CRATE: &str = "snippet";

/// A successful compilation.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    /// Non-fatal diagnostics (warnings, notes).
    pub diagnostics: Vec<Diagnostic>,
}

/// Compile-file surface used by the pipeline.
pub trait Toolchain {
    /// Builds `source` as an rlib named `crate_name` inside `out_dir`.
    fn compile_library(&self, source: &Path, crate_name: &str, out_dir: &Path) -> Result<Artifact, TraceError>;

    /// Builds `source` as an executable at `output`, linking `externs`
    /// (`(crate name, rlib path)` pairs).
    fn compile_binary(
        &self,
        source: &Path,
        externs: &[(String, PathBuf)],
        output: &Path,
    ) -> Result<Artifact, TraceError>;
}

/// The host `rustc`.
#[derive(Debug, Clone)]
pub struct RustcToolchain {
    pub rustc: PathBuf,
    pub edition: String,
}

impl RustcToolchain {
    pub fn new(rustc: impl Into<PathBuf>, edition: impl Into<String>) -> Self {
        RustcToolchain {
            rustc: rustc.into(),
            edition: edition.into(),
        }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.rustc);
        cmd.arg("--edition")
            .arg(&self.edition)
            .arg("--error-format=json")
            .args(["-C", "debuginfo=2", "-C", "opt-level=0"]);
        cmd
    }

    fn run(&self, mut cmd: Command) -> Result<(Output, Vec<Diagnostic>), TraceError> {
        tracing::debug!(command = ?cmd, "invoking rustc");
        let output = cmd.output().map_err(|err| {
            ExecutionFailure::new(
                FailureKind::Toolchain,
                format!("failed to run {}: {err}", self.rustc.display()),
            )
        })?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        let diagnostics = parse_diagnostics(&stderr);
        Ok((output, diagnostics))
    }
}

impl Toolchain for RustcToolchain {
    fn compile_library(&self, source: &Path, crate_name: &str, out_dir: &Path) -> Result<Artifact, TraceError> {
        let mut cmd = self.base_command();
        cmd.args(["--crate-type", "rlib", "--crate-name", crate_name])
            .arg("--out-dir")
            .arg(out_dir)
            .arg(source);
        let (output, diagnostics) = self.run(cmd)?;
        let path = out_dir.join(format!("lib{crate_name}.rlib"));
        if !output.status.success() || diagnostics.iter().any(Diagnostic::is_error) || !path.exists() {
            let failure = CompileFailure { diagnostics };
            return Err(ExecutionFailure::new(
                FailureKind::Toolchain,
                format!("support crate `{crate_name}` failed to build"),
            )
            .with_stack(failure.to_string())
            .into());
        }
        Ok(Artifact { path, diagnostics })
    }

    fn compile_binary(
        &self,
        source: &Path,
        externs: &[(String, PathBuf)],
        output_path: &Path,
    ) -> Result<Artifact, TraceError> {
        let mut cmd = self.base_command();
        cmd.args(["--crate-type", "bin", "--crate-name", SNIPPET_CRATE]);
        for (name, rlib) in externs {
            cmd.arg("--extern").arg(format!("{name}={}", rlib.display()));
            if let Some(dir) = rlib.parent() {
                cmd.arg("-L").arg(format!("dependency={}", dir.display()));
            }
        }
        cmd.arg("-o").arg(output_path).arg(source);

        let (output, mut diagnostics) = self.run(cmd)?;
        let failed = !output.status.success() || diagnostics.iter().any(Diagnostic::is_error);
        if failed {
            if diagnostics.is_empty() {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let message = if stderr.is_empty() {
                    format!("rustc exited with {}", output.status)
                } else {
                    stderr
                };
                diagnostics.push(Diagnostic {
                    level: "error".to_string(),
                    message: message.clone(),
                    line: None,
                    column: None,
                    rendered: message,
                });
            }
            return Err(CompileFailure { diagnostics }.into());
        }
        Ok(Artifact {
            path: output_path.to_path_buf(),
            diagnostics,
        })
    }
}

// ---------------------------------------------------------------------------
// Diagnostic stream
// ---------------------------------------------------------------------------

/// One line of `rustc --error-format=json` output.
#[derive(Debug, Deserialize)]
struct RustcMessage {
    #[serde(rename = "$message_type", default)]
    message_type: Option<String>,
    message: String,
    level: String,
    #[serde(default)]
    spans: Vec<RustcSpan>,
    rendered: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RustcSpan {
    line_start: usize,
    column_start: usize,
    #[serde(default)]
    is_primary: bool,
}

/// Decodes every JSON diagnostic in `stderr`; other lines are ignored.
pub fn parse_diagnostics(stderr: &str) -> Vec<Diagnostic> {
    stderr
        .lines()
        .filter(|line| line.trim_start().starts_with('{'))
        .filter_map(|line| serde_json::from_str::<RustcMessage>(line).ok())
        .filter(|msg| msg.message_type.as_deref().map_or(true, |t| t == "diagnostic"))
        .map(|msg| {
            let primary = msg.spans.iter().find(|s| s.is_primary).or(msg.spans.first());
            let rendered = msg
                .rendered
                .unwrap_or_else(|| format!("{}: {}", msg.level, msg.message));
            Diagnostic {
                level: msg.level,
                message: msg.message,
                line: primary.map(|s| s.line_start),
                column: primary.map(|s| s.column_start),
                rendered,
            }
        })
        .collect()
}
