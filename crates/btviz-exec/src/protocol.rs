//! Decoding the event stream written by a traced snippet.
//!
//! Each line of the event file is one `capture_step!` call. Lines are fed to
//! the run's [`TraceCollector`] in file order through [`EventInspector`],
//! which presents the event's rendered backtrace and call site as the call
//! chain the collector would otherwise inspect itself.

use std::fs;
use std::io;
use std::path::Path;

use btviz_core::backtrace::{parse_backtrace, RawFrame};
use btviz_core::value::from_alternating;
use btviz_core::{CallChainInspector, TraceCollector, TraceValue};
use serde::Deserialize;

use crate::error::{ExecutionFailure, FailureKind};

/// One decoded instrumentation call.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub action: String,
    #[serde(default)]
    pub details: String,
    /// Alternating key/value sequence.
    #[serde(default)]
    pub variables: Vec<TraceValue>,
    /// Full path of the function the macro expanded in.
    pub function: Option<String>,
    pub line: Option<u32>,
    pub backtrace: Option<String>,
}

/// Call-chain view over a recorded event.
pub struct EventInspector<'a> {
    event: &'a Event,
}

impl<'a> EventInspector<'a> {
    pub fn new(event: &'a Event) -> Self {
        EventInspector { event }
    }
}

impl CallChainInspector for EventInspector<'_> {
    fn call_chain(&self) -> Option<Vec<RawFrame>> {
        let frames = parse_backtrace(self.event.backtrace.as_deref()?);
        (!frames.is_empty()).then_some(frames)
    }

    fn call_site(&self) -> Option<RawFrame> {
        let function = self.event.function.as_deref()?;
        Some(RawFrame::new(function, self.event.line))
    }
}

/// Decodes one event line.
pub fn decode_line(line: &str) -> Result<Event, serde_json::Error> {
    serde_json::from_str(line)
}

/// Records every event of `text` into `collector`.
pub fn ingest_str(text: &str, collector: &mut TraceCollector) -> Result<(), ExecutionFailure> {
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event = decode_line(line).map_err(|err| {
            ExecutionFailure::new(
                FailureKind::Protocol,
                format!("malformed event on line {}: {err}", index + 1),
            )
            .with_stack(line.to_string())
        })?;
        let variables = from_alternating(event.variables.clone());
        let step = collector.record(
            event.action.clone(),
            event.details.clone(),
            variables,
            &EventInspector::new(&event),
        );
        tracing::debug!(sequence = step.sequence, action = %step.action, function = %step.function, "step recorded");
    }
    Ok(())
}

/// Records the events of the file at `path`. A missing file means the
/// snippet never called `capture_step!`.
pub fn ingest_file(path: &Path, collector: &mut TraceCollector) -> Result<(), ExecutionFailure> {
    match fs::read_to_string(path) {
        Ok(text) => ingest_str(&text, collector),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ExecutionFailure::io("reading event file", err)),
    }
}
