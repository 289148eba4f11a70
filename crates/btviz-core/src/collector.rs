//! The run-scoped trace collector.
//!
//! A [`TraceCollector`] owns everything one trace run accumulates: the
//! ordered step log, the monotonic sequence counter, and a shadow of the last
//! captured call stack. One collector is constructed per run and passed
//! explicitly to every instrumentation call site; nothing here is global, so
//! concurrent runs cannot interleave.
//!
//! Naming and line information come from a [`CallChainInspector`], a
//! capability supplied by whoever hosts the instrumented code. When the chain
//! is unavailable, fields fall back to the `"unknown"` sentinel.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::HashMap;

use indexmap::IndexMap;

use crate::backtrace::{parse_backtrace, qualified_parts, short_name, RawFrame};
use crate::trace::{SourceLine, StackFrame, TraceStep, UNKNOWN_FUNCTION};
use crate::value::{TraceValue, Variables};

// ---------------------------------------------------------------------------
// Call-chain inspection
// ---------------------------------------------------------------------------

/// Source of the active call chain at the moment of an instrumentation call.
pub trait CallChainInspector {
    /// Frames of the active chain, innermost first. `None` when the chain
    /// cannot be inspected.
    fn call_chain(&self) -> Option<Vec<RawFrame>>;

    /// The exact call site, when the caller knows it independently of the
    /// chain (e.g. from `line!()` at a macro expansion).
    fn call_site(&self) -> Option<RawFrame> {
        None
    }
}

/// Inspects the current thread with `std::backtrace`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BacktraceInspector;

impl CallChainInspector for BacktraceInspector {
    fn call_chain(&self) -> Option<Vec<RawFrame>> {
        let backtrace = Backtrace::force_capture();
        if backtrace.status() != BacktraceStatus::Captured {
            return None;
        }
        let frames = parse_backtrace(&backtrace.to_string());
        (!frames.is_empty()).then_some(frames)
    }
}

/// An inspector that yields nothing, forcing the `"unknown"` fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInspector;

impl CallChainInspector for NoInspector {
    fn call_chain(&self) -> Option<Vec<RawFrame>> {
        None
    }
}

// ---------------------------------------------------------------------------
// Frame denylist
// ---------------------------------------------------------------------------

/// Symbol prefixes excluded from captured call stacks.
///
/// Frames of the runtime, the standard library, the test harness and the
/// instrumentation machinery itself never appear in a [`TraceStep`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDenylist {
    prefixes: Vec<String>,
    exact: Vec<String>,
}

const DEFAULT_PREFIXES: &[&str] = &[
    "std::",
    "core::",
    "alloc::",
    "test::",
    "backtrace::",
    "panic_unwind::",
    "gimli::",
    "addr2line::",
    "miniz_oxide::",
    "object::",
    "rustc_demangle::",
    "__rust",
    "__libc",
    "__scrt",
    "_start",
    "rust_begin_unwind",
    "start_thread",
    "__GI_",
    "__clone",
    "_pthread",
    "btviz_trace::",
    "btviz_core::",
    "btviz_exec::",
];

const DEFAULT_EXACT: &[&str] = &[
    "main",
    "clone",
    "clone3",
    "__clone",
    "thread_start",
    "invoke_main",
    "mainCRTStartup",
    "BaseThreadInitThunk",
    "RtlUserThreadStart",
    "<unknown>",
];

impl Default for FrameDenylist {
    fn default() -> Self {
        FrameDenylist {
            prefixes: DEFAULT_PREFIXES.iter().map(|s| s.to_string()).collect(),
            exact: DEFAULT_EXACT.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FrameDenylist {
    /// An empty list that keeps every frame.
    pub fn empty() -> Self {
        FrameDenylist {
            prefixes: Vec::new(),
            exact: Vec::new(),
        }
    }

    /// Adds a prefix to the list.
    pub fn deny_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    /// Returns `true` if `symbol` belongs to denied machinery.
    ///
    /// Qualified symbols (`<&dyn core::ops::Fn<()> as FnOnce<()>>::call_once`)
    /// are denied when either their self type or their trait path is.
    pub fn is_denied(&self, symbol: &str) -> bool {
        if self.exact.iter().any(|e| e == symbol) {
            return true;
        }
        match qualified_parts(symbol) {
            Some((self_ty, trait_path)) => {
                self.denies_path(self_ty) || trait_path.is_some_and(|t| self.denies_path(t))
            }
            None => self.denies_path(symbol),
        }
    }

    fn denies_path(&self, path: &str) -> bool {
        self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Signature index
// ---------------------------------------------------------------------------

/// Declared parameter names per routine, keyed by short routine name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureIndex {
    params: HashMap<String, Vec<String>>,
}

impl SignatureIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a routine. The first registration of a name wins.
    pub fn insert(&mut self, routine: impl Into<String>, params: Vec<String>) {
        self.params.entry(routine.into()).or_insert(params);
    }

    pub fn params(&self, routine: &str) -> &[String] {
        self.params.get(routine).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Per-run trace state.
#[derive(Debug)]
pub struct TraceCollector {
    steps: Vec<TraceStep>,
    next_sequence: u64,
    /// Call stack captured by the previous step, oldest first.
    shadow: Vec<StackFrame>,
    denylist: FrameDenylist,
    signatures: SignatureIndex,
}

impl Default for TraceCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceCollector {
    pub fn new() -> Self {
        TraceCollector {
            steps: Vec::new(),
            next_sequence: 1,
            shadow: Vec::new(),
            denylist: FrameDenylist::default(),
            signatures: SignatureIndex::new(),
        }
    }

    pub fn with_denylist(mut self, denylist: FrameDenylist) -> Self {
        self.denylist = denylist;
        self
    }

    pub fn with_signatures(mut self, signatures: SignatureIndex) -> Self {
        self.signatures = signatures;
        self
    }

    /// Starts the run over with an empty log.
    pub fn reset(&mut self) {
        self.steps.clear();
        self.next_sequence = 1;
        self.shadow.clear();
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Consumes the collector, yielding the ordered log.
    pub fn into_steps(self) -> Vec<TraceStep> {
        self.steps
    }

    /// Records one instrumentation call and returns the created step.
    pub fn record(
        &mut self,
        action: impl Into<String>,
        details: impl Into<String>,
        variables: Variables,
        inspector: &dyn CallChainInspector,
    ) -> &TraceStep {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        // Innermost first, machinery removed.
        let mut user_frames: Vec<RawFrame> = inspector
            .call_chain()
            .unwrap_or_default()
            .into_iter()
            .filter(|f| !self.denylist.is_denied(&f.symbol))
            .collect();

        let site = inspector.call_site();
        if let Some(site) = &site {
            if user_frames.is_empty() {
                user_frames.push(site.clone());
            } else if short_name(&site.symbol) == short_name(&user_frames[0].symbol) {
                user_frames[0].line = site.line.or(user_frames[0].line);
            }
        }

        let (function, source_line) = match (&site, user_frames.first()) {
            (Some(site), _) => (short_name(&site.symbol), SourceLine::from(site.line)),
            (None, Some(innermost)) => (short_name(&innermost.symbol), SourceLine::from(innermost.line)),
            (None, None) => (UNKNOWN_FUNCTION.to_string(), SourceLine::UNKNOWN),
        };

        user_frames.reverse();
        let call_stack = self.build_stack(&user_frames, &variables);
        self.shadow = call_stack.clone();

        self.steps.push(TraceStep {
            sequence,
            function,
            variables,
            call_stack,
            source_line,
            action: action.into(),
            details: details.into(),
        });
        &self.steps[self.steps.len() - 1]
    }

    /// Records a step from the current thread's native call chain.
    pub fn capture_step<K, V>(
        &mut self,
        action: impl Into<String>,
        details: impl Into<String>,
        variables: impl IntoIterator<Item = (K, V)>,
    ) -> u64
    where
        K: Into<String>,
        V: Into<TraceValue>,
    {
        let variables: Variables = variables
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.record(action, details, variables, &BacktraceInspector).sequence
    }

    /// Single-variable convenience form of [`capture_step`](Self::capture_step).
    pub fn capture_one(
        &mut self,
        action: impl Into<String>,
        details: impl Into<String>,
        key: &str,
        value: impl Into<TraceValue>,
    ) -> u64 {
        self.capture_step(action, details, [(key, value)])
    }

    /// Builds frames (oldest first) for the filtered chain.
    ///
    /// The innermost frame takes its parameter values from `variables`;
    /// remaining variables become its locals. Outer frames keep the values
    /// last observed at the same position when the function matches.
    fn build_stack(&self, frames: &[RawFrame], variables: &Variables) -> Vec<StackFrame> {
        let innermost = frames.len().saturating_sub(1);
        frames
            .iter()
            .enumerate()
            .map(|(pos, raw)| {
                let name = short_name(&raw.symbol);
                let declared = self.signatures.params(&name);
                let line = SourceLine::from(raw.line);

                if pos == innermost {
                    let parameters = declared
                        .iter()
                        .map(|p| (p.clone(), variables.get(p).cloned()))
                        .collect();
                    let local_variables = variables
                        .iter()
                        .filter(|(k, _)| !declared.contains(k))
                        .map(|(k, v)| (k.clone(), Some(v.clone())))
                        .collect();
                    return StackFrame {
                        function_name: name,
                        parameters,
                        local_variables,
                        line_number: line,
                    };
                }

                match self.shadow.get(pos) {
                    Some(prev) if prev.function_name == name => StackFrame {
                        function_name: name,
                        parameters: prev.parameters.clone(),
                        local_variables: prev.local_variables.clone(),
                        line_number: line,
                    },
                    _ => StackFrame {
                        function_name: name,
                        parameters: declared.iter().map(|p| (p.clone(), None)).collect(),
                        local_variables: IndexMap::new(),
                        line_number: line,
                    },
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// A fixed chain, innermost first.
    struct FixedChain(Vec<RawFrame>);

    impl CallChainInspector for FixedChain {
        fn call_chain(&self) -> Option<Vec<RawFrame>> {
            Some(self.0.clone())
        }
    }

    struct SiteOnly(RawFrame);

    impl CallChainInspector for SiteOnly {
        fn call_chain(&self) -> Option<Vec<RawFrame>> {
            None
        }
        fn call_site(&self) -> Option<RawFrame> {
            Some(self.0.clone())
        }
    }

    fn chain(symbols: &[(&str, u32)]) -> FixedChain {
        FixedChain(
            symbols
                .iter()
                .map(|(s, l)| RawFrame::new(*s, Some(*l)))
                .collect(),
        )
    }

    fn permute_index() -> SignatureIndex {
        let mut index = SignatureIndex::new();
        index.insert("permute", vec!["nums".into(), "start".into()]);
        index.insert("main", vec![]);
        index
    }

    #[test]
    fn sequences_start_at_one() {
        let mut collector = TraceCollector::new();
        for action in ["recurse", "swap", "backtrack"] {
            collector.record(action, "", Variables::new(), &NoInspector);
        }
        let seqs: Vec<u64> = collector.steps().iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn unknown_chain_falls_back_to_sentinel() {
        let mut collector = TraceCollector::new();
        let step = collector.record("swap", "d", Variables::new(), &NoInspector);
        assert_eq!(step.function, "unknown");
        assert_eq!(step.source_line, SourceLine::UNKNOWN);
        assert!(step.call_stack.is_empty());
    }

    #[test]
    fn denied_frames_are_dropped_and_order_is_oldest_first() {
        let mut collector = TraceCollector::new().with_signatures(permute_index());
        let inspector = chain(&[
            ("btviz_trace::emit", 40),
            ("snippet::Solver::permute", 14),
            ("snippet::Solver::permute", 18),
            ("snippet::main", 30),
            ("core::ops::function::FnOnce::call_once", 250),
            ("<alloc::boxed::Box<F> as core::ops::function::FnOnce<A>>::call_once", 1),
            ("main", 0),
        ]);
        let mut vars = Variables::new();
        vars.insert("start".into(), TraceValue::Int(1));
        vars.insert("i".into(), TraceValue::Int(0));

        let step = collector.record("swap", "", vars, &inspector);
        let names: Vec<&str> = step.call_stack.iter().map(|f| f.function_name.as_str()).collect();
        assert_eq!(names, vec!["main", "permute", "permute"]);
        assert_eq!(step.function, "permute");
        assert_eq!(step.source_line, SourceLine::Known(14));

        let innermost = step.call_stack.last().unwrap();
        assert_eq!(innermost.parameters["start"], Some(TraceValue::Int(1)));
        assert_eq!(innermost.parameters["nums"], None);
        assert_eq!(innermost.local_variables["i"], Some(TraceValue::Int(0)));

        let outer = &step.call_stack[1];
        assert_eq!(outer.parameters["start"], None);
    }

    #[test]
    fn outer_frames_inherit_shadow_values() {
        let mut collector = TraceCollector::new().with_signatures(permute_index());
        let mut vars = Variables::new();
        vars.insert("start".into(), TraceValue::Int(0));
        collector.record(
            "recurse",
            "",
            vars,
            &chain(&[("snippet::permute", 5), ("snippet::main", 20)]),
        );

        let mut vars = Variables::new();
        vars.insert("start".into(), TraceValue::Int(1));
        let step = collector.record(
            "recurse",
            "",
            vars,
            &chain(&[
                ("snippet::permute", 5),
                ("snippet::permute", 9),
                ("snippet::main", 20),
            ]),
        );
        assert_eq!(step.call_stack[1].parameters["start"], Some(TraceValue::Int(0)));
        assert_eq!(step.call_stack[1].line_number, SourceLine::Known(9));
        assert_eq!(step.call_stack[2].parameters["start"], Some(TraceValue::Int(1)));
    }

    #[test]
    fn call_site_overrides_function_and_line() {
        let mut collector = TraceCollector::new();
        let step = collector.record(
            "base_case",
            "",
            Variables::new(),
            &SiteOnly(RawFrame::new("snippet::Solver::permute", Some(22))),
        );
        assert_eq!(step.function, "permute");
        assert_eq!(step.source_line, SourceLine::Known(22));
        assert_eq!(step.call_stack.len(), 1);
    }

    #[test]
    fn reset_restarts_numbering() {
        let mut collector = TraceCollector::new();
        collector.record("a", "", Variables::new(), &NoInspector);
        collector.reset();
        let step = collector.record("b", "", Variables::new(), &NoInspector);
        assert_eq!(step.sequence, 1);
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn denylist_matches_prefixes_and_exact_names() {
        let list = FrameDenylist::default();
        assert!(list.is_denied("std::rt::lang_start"));
        assert!(list.is_denied("<std::thread::Builder>::spawn"));
        assert!(list.is_denied("main"));
        assert!(!list.is_denied("snippet::main"));
        assert!(!list.is_denied("snippet::maintain"));
        assert!(list.clone().deny_prefix("snippet::helpers::").is_denied("snippet::helpers::swap"));
        assert!(!FrameDenylist::empty().is_denied("std::rt::lang_start"));
    }

    const ENTRY_SHIM: &str = "<&dyn core::ops::function::Fn<(), Output = i32> + core::marker::Sync + core::panic::unwind_safe::RefUnwindSafe as core::ops::function::FnOnce<()>>::call_once";

    #[test]
    fn qualified_std_frames_are_denied() {
        let list = FrameDenylist::default();
        assert!(list.is_denied(ENTRY_SHIM));
        assert!(list.is_denied("<&mut std::io::Stdout as std::io::Write>::flush"));
        assert!(list.is_denied("<*const alloc::vec::Vec<u8>>::len"));
        assert!(list.is_denied("<snippet::Walk as core::iter::Iterator>::next"));
        assert!(!list.is_denied("<snippet::Board as snippet::Solver>::place"));
        assert!(!list.is_denied("<&snippet::Board>::place"));
    }

    #[test]
    fn entry_shim_never_reaches_the_stack() {
        let mut collector = TraceCollector::new().with_signatures(permute_index());
        let inspector = chain(&[
            ("btviz_trace::emit", 40),
            ("snippet::permute", 5),
            ("snippet::permute", 5),
            ("snippet::main", 7),
            ("core::ops::function::FnOnce::call_once", 250),
            (ENTRY_SHIM, 287),
            ("std::rt::lang_start_internal", 1),
            ("main", 0),
        ]);
        let step = collector.record("swap", "", Variables::new(), &inspector);
        let names: Vec<&str> = step.call_stack.iter().map(|f| f.function_name.as_str()).collect();
        assert_eq!(names, vec!["main", "permute", "permute"]);
    }

    proptest! {
        #[test]
        fn sequence_is_contiguous_for_any_call_count(
            actions in proptest::collection::vec("[a-z_]{1,8}", 0..64)
        ) {
            let mut collector = TraceCollector::new();
            for action in &actions {
                collector.record(action.as_str(), "", Variables::new(), &NoInspector);
            }
            let seqs: Vec<u64> = collector.steps().iter().map(|s| s.sequence).collect();
            let expected: Vec<u64> = (1..=actions.len() as u64).collect();
            prop_assert_eq!(seqs, expected);
        }

        #[test]
        fn no_denied_frame_survives(
            user in proptest::collection::vec("[a-z]{1,6}", 0..6),
            noise in proptest::collection::vec(
                prop::sample::select(DEFAULT_PREFIXES.to_vec()), 0..6)
        ) {
            let mut frames: Vec<RawFrame> = noise
                .iter()
                .map(|p| RawFrame::new(format!("{p}inner"), None))
                .collect();
            frames.extend(user.iter().map(|u| RawFrame::new(format!("snippet::u_{u}"), Some(1))));
            let mut collector = TraceCollector::new();
            let step = collector.record("x", "", Variables::new(), &FixedChain(frames));
            prop_assert_eq!(step.call_stack.len(), user.len());
            for frame in &step.call_stack {
                prop_assert!(frame.function_name.starts_with("u_"));
            }
        }
    }
}
