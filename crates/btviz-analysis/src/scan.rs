//! Locating `capture_step!` invocations without executing anything.
//!
//! The scan serves two callers: the pipeline checks that a snippet is
//! instrumented before compiling it, and [`static_trace`] turns the
//! invocations into a trace whose values are whatever can be read off the
//! literal arguments.

use btviz_core::trace::SourceLine;
use btviz_core::{StackFrame, TraceStep, TraceValue, Variables};
use serde::Serialize;
use syn::visit::{self, Visit};

use crate::error::AnalysisError;
use crate::syntax::{
    descend_into_macro, line_of, literal_value, macro_args, param_names, string_literal, SyntaxTree,
};

/// Name of the instrumentation macro.
pub const CAPTURE_MACRO: &str = "capture_step";
/// Function reported for invocations outside any routine.
pub const GLOBAL_SCOPE: &str = "global";

/// One `capture_step!` invocation found in the tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSite {
    pub line: usize,
    /// Enclosing routine, if any.
    pub routine: Option<String>,
    /// Parameter names of the enclosing routine.
    pub routine_params: Vec<String>,
    pub action: String,
    pub details: String,
    pub variables: Variables,
}

/// Every `capture_step!` invocation in textual order.
///
/// Both the in-process form (`capture_step!(collector, action, ...)`) and the
/// snippet form (`capture_step!(action, ...)`) are recognized; the two are
/// told apart by argument count, since key/value pairs keep the snippet form
/// even.
pub fn find_instrumentation(tree: &SyntaxTree) -> Vec<CaptureSite> {
    let mut scanner = Scanner::default();
    scanner.visit_file(tree.file());
    scanner.sites
}

/// Builds a trace from the literal arguments of every `capture_step!` call.
pub fn static_trace(source: &str) -> Result<Vec<TraceStep>, AnalysisError> {
    let tree = SyntaxTree::parse(source)?;
    let sites = find_instrumentation(&tree);
    if sites.is_empty() {
        return Err(AnalysisError::NoInstrumentation);
    }

    let steps = sites
        .into_iter()
        .enumerate()
        .map(|(i, site)| {
            let line = SourceLine::Known(site.line as u32);
            let function = site.routine.unwrap_or_else(|| GLOBAL_SCOPE.to_string());
            let frame = StackFrame::with_placeholders(function.clone(), site.routine_params, line);
            TraceStep {
                sequence: i as u64 + 1,
                function,
                variables: site.variables,
                call_stack: vec![frame],
                source_line: line,
                action: site.action,
                details: site.details,
            }
        })
        .collect();
    Ok(steps)
}

#[derive(Default)]
struct Scanner {
    /// (name, params) of the routines currently being walked.
    scopes: Vec<(String, Vec<String>)>,
    sites: Vec<CaptureSite>,
}

impl Scanner {
    fn enter(&mut self, sig: &syn::Signature) {
        self.scopes.push((sig.ident.to_string(), param_names(sig)));
    }

    fn record(&mut self, mac: &syn::Macro) {
        let args: Vec<syn::Expr> = macro_args(mac).map(|p| p.into_iter().collect()).unwrap_or_default();
        let args = if args.len() % 2 == 1 { &args[1..] } else { &args[..] };

        let action = args.first().and_then(string_literal).unwrap_or_else(|| "unknown".to_string());
        let details = args.get(1).and_then(string_literal).unwrap_or_default();

        let mut variables = Variables::new();
        for pair in args.get(2..).unwrap_or_default().chunks_exact(2) {
            let key = match literal_value(&pair[0]) {
                TraceValue::Str(s) => s,
                other => other.to_string(),
            };
            variables.insert(key, literal_value(&pair[1]));
        }

        let (routine, routine_params) = match self.scopes.last() {
            Some((name, params)) => (Some(name.clone()), params.clone()),
            None => (None, Vec::new()),
        };
        self.sites.push(CaptureSite {
            line: line_of(mac),
            routine,
            routine_params,
            action,
            details,
            variables,
        });
    }
}

impl<'ast> Visit<'ast> for Scanner {
    fn visit_item_fn(&mut self, node: &'ast syn::ItemFn) {
        self.enter(&node.sig);
        visit::visit_item_fn(self, node);
        self.scopes.pop();
    }

    fn visit_impl_item_fn(&mut self, node: &'ast syn::ImplItemFn) {
        self.enter(&node.sig);
        visit::visit_impl_item_fn(self, node);
        self.scopes.pop();
    }

    fn visit_trait_item_fn(&mut self, node: &'ast syn::TraitItemFn) {
        self.enter(&node.sig);
        visit::visit_trait_item_fn(self, node);
        self.scopes.pop();
    }

    fn visit_macro(&mut self, node: &'ast syn::Macro) {
        if node.path.segments.last().is_some_and(|s| s.ident == CAPTURE_MACRO) {
            self.record(node);
        } else {
            descend_into_macro(self, node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNIPPET: &str = r#"use btviz_trace::capture_step;

struct Permutations;

impl Permutations {
    fn permute(nums: &mut Vec<i32>, start: usize) {
        if start == nums.len() {
            capture_step!("base_case", "complete", "nums", vec![1, 2]);
            return;
        }
        for i in start..nums.len() {
            nums.swap(start, i);
            btviz_trace::capture_step!("swap", "swap two", "i", i, "start", 0);
            Self::permute(nums, start + 1);
            capture_step!("backtrack", "undo");
        }
    }
}

fn main() {
    capture_step!(label(), "begin", "ratio", -0.5, "flag", true);
    Permutations::permute(&mut vec![1, 2], 0);
}
"#;

    #[test]
    fn finds_sites_with_scope_and_line() {
        let tree = SyntaxTree::parse(SNIPPET).unwrap();
        let sites = find_instrumentation(&tree);
        let actions: Vec<&str> = sites.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(actions, vec!["base_case", "swap", "backtrack", "unknown"]);
        assert_eq!(sites[0].line, 8);
        assert_eq!(sites[0].routine.as_deref(), Some("permute"));
        assert_eq!(sites[0].routine_params, vec!["nums", "start"]);
        assert_eq!(sites[3].routine.as_deref(), Some("main"));
    }

    #[test]
    fn literal_arguments_become_values() {
        let tree = SyntaxTree::parse(SNIPPET).unwrap();
        let sites = find_instrumentation(&tree);
        assert_eq!(
            sites[0].variables["nums"],
            TraceValue::List(vec![TraceValue::Int(1), TraceValue::Int(2)])
        );
        assert_eq!(sites[1].variables["i"], TraceValue::Str("i".into()));
        assert_eq!(sites[1].variables["start"], TraceValue::Int(0));
        assert!(sites[2].variables.is_empty());
        assert_eq!(sites[3].variables["ratio"], TraceValue::Float(-0.5));
        assert_eq!(sites[3].details, "begin");
    }

    #[test]
    fn collector_argument_is_skipped() {
        let src = r#"fn f(tc: &mut TraceCollector) { capture_step!(tc, "recurse", "go", "depth", 3); }"#;
        let tree = SyntaxTree::parse(src).unwrap();
        let sites = find_instrumentation(&tree);
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].action, "recurse");
        assert_eq!(sites[0].variables["depth"], TraceValue::Int(3));
    }

    #[test]
    fn static_trace_numbers_steps_and_builds_frames() {
        let steps = static_trace(SNIPPET).unwrap();
        assert_eq!(steps.len(), 4);
        let sequences: Vec<u64> = steps.iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);

        let swap = &steps[1];
        assert_eq!(swap.function, "permute");
        assert_eq!(swap.source_line, SourceLine::Known(13));
        assert_eq!(swap.call_stack.len(), 1);
        assert_eq!(swap.call_stack[0].function_name, "permute");
        assert_eq!(swap.call_stack[0].parameters.get("nums"), Some(&None));
    }

    #[test]
    fn top_level_sites_are_global() {
        let src = r#"const _: () = { capture_step!("init", "top"); };"#;
        let steps = static_trace(src).unwrap();
        assert_eq!(steps[0].function, GLOBAL_SCOPE);
        assert!(steps[0].call_stack[0].parameters.is_empty());
    }

    #[test]
    fn no_sites_is_an_error() {
        let err = static_trace("fn main() {}").unwrap_err();
        assert!(matches!(err, AnalysisError::NoInstrumentation));
    }

    #[test]
    fn sites_nested_in_other_macros_are_found() {
        let src = r#"fn main() { assert!({ capture_step!("check", "inside"); true }); }"#;
        let steps = static_trace(src).unwrap();
        assert_eq!(steps[0].action, "check");
    }

    #[test]
    fn sites_serialize_in_camel_case() {
        let tree = SyntaxTree::parse(SNIPPET).unwrap();
        let json = serde_json::to_value(&find_instrumentation(&tree)[1]).unwrap();
        assert_eq!(json["routineParams"], serde_json::json!(["nums", "start"]));
        assert_eq!(json["variables"]["start"], serde_json::json!({"type": "int", "value": 0}));
    }
}
