//! Ordered execution trace records.
//!
//! A [`TraceStep`] is created exactly once by a
//! [`TraceCollector`](crate::collector::TraceCollector) in response to one
//! instrumentation call and never mutated afterwards.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::{TraceValue, Variables};

/// Function name used when the call chain cannot be inspected.
pub const UNKNOWN_FUNCTION: &str = "unknown";

/// A source line, or the `"unknown"` sentinel when it could not be determined.
///
/// Serializes as a bare integer or the string `"unknown"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceLine {
    Known(u32),
    Unknown(UnknownLine),
}

/// Serialized form of [`SourceLine::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownLine {
    Unknown,
}

impl SourceLine {
    pub const UNKNOWN: SourceLine = SourceLine::Unknown(UnknownLine::Unknown);

    /// Returns the line number if known.
    pub fn line(self) -> Option<u32> {
        match self {
            SourceLine::Known(line) => Some(line),
            SourceLine::Unknown(_) => None,
        }
    }
}

impl From<Option<u32>> for SourceLine {
    fn from(line: Option<u32>) -> Self {
        line.map_or(SourceLine::UNKNOWN, SourceLine::Known)
    }
}

/// One frame of a captured call stack.
///
/// Parameter and local values are `None` when only the name is known
/// (statically derived frames, or frames whose values were never observed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub function_name: String,
    pub parameters: IndexMap<String, Option<TraceValue>>,
    pub local_variables: IndexMap<String, Option<TraceValue>>,
    pub line_number: SourceLine,
}

impl StackFrame {
    /// Creates a frame whose parameters are known by name only.
    pub fn with_placeholders<I, S>(function_name: impl Into<String>, params: I, line: SourceLine) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StackFrame {
            function_name: function_name.into(),
            parameters: params.into_iter().map(|p| (p.into(), None)).collect(),
            local_variables: IndexMap::new(),
            line_number: line,
        }
    }
}

/// One recorded step of a trace run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    /// 1-based, strictly increasing within one run.
    pub sequence: u64,
    /// Best-effort name of the routine that made the call.
    pub function: String,
    pub variables: Variables,
    /// Oldest frame first, innermost last.
    pub call_stack: Vec<StackFrame>,
    pub source_line: SourceLine,
    /// Caller-supplied tag such as `swap`, `recurse`, `backtrack`.
    pub action: String,
    pub details: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_line_serializes_as_number_or_sentinel() {
        assert_eq!(serde_json::to_string(&SourceLine::Known(12)).unwrap(), "12");
        assert_eq!(serde_json::to_string(&SourceLine::UNKNOWN).unwrap(), "\"unknown\"");

        let back: SourceLine = serde_json::from_str("\"unknown\"").unwrap();
        assert_eq!(back, SourceLine::UNKNOWN);
        let back: SourceLine = serde_json::from_str("7").unwrap();
        assert_eq!(back.line(), Some(7));
    }

    #[test]
    fn trace_step_uses_camel_case_fields() {
        let step = TraceStep {
            sequence: 1,
            function: "permute".into(),
            variables: Variables::new(),
            call_stack: vec![StackFrame::with_placeholders(
                "permute",
                ["nums", "start"],
                SourceLine::Known(4),
            )],
            source_line: SourceLine::Known(5),
            action: "recurse".into(),
            details: "enter".into(),
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["sourceLine"], 5);
        assert_eq!(json["callStack"][0]["functionName"], "permute");
        assert!(json["callStack"][0]["parameters"]["nums"].is_null());
        assert_eq!(json["callStack"][0]["lineNumber"], 4);
    }
}
