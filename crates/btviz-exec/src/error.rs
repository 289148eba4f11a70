//! Trace pipeline error types.
//!
//! Every failure a caller can see is one of three categories: the snippet
//! has no unit to build, the toolchain rejected it, or running it failed.
//! Cleanup problems are logged and never show up here.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors returned by [`run_trace`](crate::run_trace).
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TraceError {
    /// No top-level `struct`, `enum`, `trait` or `mod` to name the build after.
    #[error("no declaration found: the snippet needs a top-level struct, enum, trait or mod")]
    NoDeclaration,

    /// The snippet did not compile.
    #[error("compilation failed:\n{0}")]
    Compile(CompileFailure),

    /// The compiled snippet could not be run to completion.
    #[error("execution error: {0}")]
    Execution(ExecutionFailure),
}

/// One compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// `error`, `warning`, `note`, ...
    pub level: String,
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
    /// Human-readable rendering, including the source excerpt.
    pub rendered: String,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.level.starts_with("error")
    }
}

/// Diagnostics of a failed compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileFailure {
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileFailure {
    /// A failure carrying a single error-level message.
    pub fn single(message: impl Into<String>, line: Option<usize>, column: Option<usize>) -> Self {
        let message = message.into();
        let rendered = match line {
            Some(line) => format!("error: {message}\n --> {line}:{}", column.unwrap_or(1)),
            None => format!("error: {message}"),
        };
        CompileFailure {
            diagnostics: vec![Diagnostic {
                level: "error".to_string(),
                message,
                line,
                column,
                rendered,
            }],
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

impl fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diag) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", diag.rendered.trim_end())?;
        }
        Ok(())
    }
}

/// What stopped a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The snippet panicked.
    Panic,
    /// The process exited with a non-zero status.
    Exit,
    /// The process was terminated by a signal.
    Signal,
    /// The run exceeded the configured timeout and was killed.
    Timeout,
    /// Workspace or process I/O failed.
    Io,
    /// The event stream written by the snippet was malformed.
    Protocol,
    /// The compiler could not be invoked or the support crate did not build.
    Toolchain,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Panic => "panic",
            FailureKind::Exit => "exit",
            FailureKind::Signal => "signal",
            FailureKind::Timeout => "timeout",
            FailureKind::Io => "io",
            FailureKind::Protocol => "protocol",
            FailureKind::Toolchain => "toolchain",
        };
        f.write_str(name)
    }
}

/// Diagnostic for a run that did not complete normally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Full stack representation: the child's stderr, including any panic
    /// backtrace.
    pub stack: String,
}

impl ExecutionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        ExecutionFailure {
            kind,
            message: message.into(),
            stack: String::new(),
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = stack.into();
        self
    }

    pub fn io(context: &str, err: std::io::Error) -> Self {
        Self::new(FailureKind::Io, format!("{context}: {err}"))
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<CompileFailure> for TraceError {
    fn from(failure: CompileFailure) -> Self {
        TraceError::Compile(failure)
    }
}

impl From<ExecutionFailure> for TraceError {
    fn from(failure: ExecutionFailure) -> Self {
        TraceError::Execution(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_failure_concatenates_rendered_text() {
        let failure = CompileFailure {
            diagnostics: vec![
                Diagnostic {
                    level: "error".into(),
                    message: "expected `;`".into(),
                    line: Some(3),
                    column: Some(14),
                    rendered: "error: expected `;`\n".into(),
                },
                Diagnostic {
                    level: "warning".into(),
                    message: "unused variable".into(),
                    line: Some(2),
                    column: Some(9),
                    rendered: "warning: unused variable\n".into(),
                },
            ],
        };
        assert_eq!(failure.to_string(), "error: expected `;`\nwarning: unused variable");
        assert_eq!(failure.errors().count(), 1);
    }

    #[test]
    fn execution_failure_display_and_serde() {
        let failure = ExecutionFailure::new(FailureKind::Panic, "index out of bounds").with_stack("thread 'main' panicked");
        assert_eq!(failure.to_string(), "panic: index out of bounds");
        let json = serde_json::to_value(TraceError::Execution(failure)).unwrap();
        assert_eq!(json["kind"], "execution");
        assert_eq!(json["detail"]["kind"], "panic");
        assert_eq!(json["detail"]["stack"], "thread 'main' panicked");
    }

    #[test]
    fn no_declaration_serializes_without_detail() {
        let json = serde_json::to_value(TraceError::NoDeclaration).unwrap();
        assert_eq!(json["kind"], "no_declaration");
    }
}
