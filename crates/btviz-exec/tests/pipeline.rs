//! End-to-end pipeline tests against the host `rustc`.
//!
//! Every run uses its own temporary work root, which must be empty again
//! once `run_trace` returns.

use std::path::Path;
use std::time::Duration;

use btviz_core::{FrameDenylist, SourceLine, TraceValue};
use btviz_exec::{run_trace, FailureKind, PipelineOptions, TraceError};

fn options(root: &Path) -> PipelineOptions {
    PipelineOptions {
        work_root: Some(root.to_path_buf()),
        timeout: Some(Duration::from_secs(60)),
        ..PipelineOptions::from_env()
    }
}

fn assert_released(root: &Path) {
    let leftovers: Vec<_> = std::fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert!(leftovers.is_empty(), "workspace not released: {leftovers:?}");
}

const THREE_STEPS: &str = r#"use btviz_trace::capture_step;

struct Demo;

fn main() {
    let depth = 1;
    capture_step!("recurse", "enter", "depth", depth);
    capture_step!("swap", format!("swap {} and {}", 0, 1), "i", 0, "j", 1);
    capture_step!("backtrack", "leave");
}
"#;

const PERMUTATIONS: &str = r#"use btviz_trace::capture_step;

struct Permutations;

impl Permutations {
    fn permute(nums: &mut Vec<i32>, start: usize) {
        capture_step!("recurse", format!("enter level {}", start), "start", start);
        if start + 1 >= nums.len() {
            capture_step!("base_case", "permutation complete", "nums", nums.clone());
            return;
        }
        for i in start..nums.len() {
            nums.swap(start, i);
            capture_step!("swap", format!("swap {} and {}", start, i), "nums", nums.clone());
            Self::permute(nums, start + 1);
            nums.swap(start, i);
            capture_step!("backtrack", "undo swap", "nums", nums.clone());
        }
    }
}

fn main() {
    let mut nums = vec![1, 2];
    Permutations::permute(&mut nums, 0);
}
"#;

#[test]
fn three_calls_give_three_ordered_steps() {
    let root = tempfile::tempdir().unwrap();
    let steps = run_trace(THREE_STEPS, &options(root.path())).unwrap();
    assert_released(root.path());

    let actions: Vec<&str> = steps.iter().map(|s| s.action.as_str()).collect();
    assert_eq!(actions, vec!["recurse", "swap", "backtrack"]);
    let sequences: Vec<u64> = steps.iter().map(|s| s.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);

    assert_eq!(steps[0].function, "main");
    assert_eq!(steps[0].source_line, SourceLine::Known(7));
    assert_eq!(steps[0].variables["depth"], TraceValue::Int(1));
    assert_eq!(steps[1].details, "swap 0 and 1");
    assert_eq!(steps[1].variables["j"], TraceValue::Int(1));
    assert!(steps[2].variables.is_empty());
}

#[test]
fn permutations_of_two_elements() {
    let root = tempfile::tempdir().unwrap();
    let steps = run_trace(PERMUTATIONS, &options(root.path())).unwrap();
    assert_released(root.path());

    let actions: Vec<&str> = steps.iter().map(|s| s.action.as_str()).collect();
    assert_eq!(
        actions,
        vec![
            "recurse", "swap", "recurse", "base_case", "backtrack", "swap", "recurse", "base_case", "backtrack",
        ]
    );
    for (i, step) in steps.iter().enumerate() {
        assert_eq!(step.sequence, i as u64 + 1);
        assert_eq!(step.function, "permute");
    }

    let first_base = &steps[3];
    assert_eq!(
        first_base.variables["nums"],
        TraceValue::List(vec![TraceValue::Int(1), TraceValue::Int(2)])
    );
    let second_base = &steps[7];
    assert_eq!(
        second_base.variables["nums"],
        TraceValue::List(vec![TraceValue::Int(2), TraceValue::Int(1)])
    );

    let innermost = first_base.call_stack.last().unwrap();
    assert_eq!(innermost.function_name, "permute");
    assert_eq!(
        innermost.parameters["nums"],
        Some(TraceValue::List(vec![TraceValue::Int(1), TraceValue::Int(2)]))
    );

    let denylist = FrameDenylist::default();
    for step in &steps {
        for frame in &step.call_stack {
            // `main` is denied only as the bare C entry symbol.
            assert!(frame.function_name == "main" || !denylist.is_denied(&frame.function_name), "{frame:?}");
            assert_ne!(frame.function_name, "call_once");
        }
    }
    let names: Vec<&str> = first_base.call_stack.iter().map(|f| f.function_name.as_str()).collect();
    assert_eq!(names, vec!["main", "permute", "permute"]);
    assert_eq!(first_base.call_stack[0].line_number, SourceLine::Known(24));
}

#[test]
fn missing_semicolon_is_a_compile_error() {
    let root = tempfile::tempdir().unwrap();
    let src = "struct Broken;\n\nfn main() {\n    let x = 1\n    println!(\"{}\", x);\n}\n";
    let err = run_trace(src, &options(root.path())).unwrap_err();
    assert!(matches!(err, TraceError::Compile(_)), "got {err:?}");
    assert_released(root.path());
}

#[test]
fn type_error_carries_rustc_diagnostics() {
    let root = tempfile::tempdir().unwrap();
    let src = "struct Typed;\n\nfn main() {\n    let x: i32 = \"text\";\n    let _ = x;\n}\n";
    let err = run_trace(src, &options(root.path())).unwrap_err();
    match err {
        TraceError::Compile(failure) => {
            let first = failure.errors().next().unwrap();
            assert_eq!(first.line, Some(4));
            assert!(failure.to_string().contains("mismatched types"));
        }
        other => panic!("expected compile error, got {other:?}"),
    }
    assert_released(root.path());
}

#[test]
fn panic_is_an_execution_error_without_partial_steps() {
    let root = tempfile::tempdir().unwrap();
    let src = r#"use btviz_trace::capture_step;

struct Crash;

fn main() {
    capture_step!("recurse", "before the panic");
    let v: Vec<i32> = Vec::new();
    if v.is_empty() {
        panic!("boom at depth {}", 3);
    }
}
"#;
    let err = run_trace(src, &options(root.path())).unwrap_err();
    match err {
        TraceError::Execution(failure) => {
            assert_eq!(failure.kind, FailureKind::Panic);
            assert_eq!(failure.message, "boom at depth 3");
            assert!(failure.stack.contains("panicked"));
        }
        other => panic!("expected execution error, got {other:?}"),
    }
    assert_released(root.path());
}

#[test]
fn non_zero_exit_is_an_execution_error() {
    let root = tempfile::tempdir().unwrap();
    let src = "struct Quit;\n\nfn main() {\n    std::process::exit(7);\n}\n";
    let err = run_trace(src, &options(root.path())).unwrap_err();
    match err {
        TraceError::Execution(failure) => {
            assert_eq!(failure.kind, FailureKind::Exit);
            assert!(failure.message.contains('7'));
        }
        other => panic!("expected execution error, got {other:?}"),
    }
    assert_released(root.path());
}

#[test]
fn unwritable_event_file_fails_the_run() {
    let root = tempfile::tempdir().unwrap();
    let src = r#"use btviz_trace::capture_step;

struct Lost;

fn main() {
    std::env::set_var("BTVIZ_TRACE_FILE", "/nonexistent-btviz-dir/events.jsonl");
    capture_step!("recurse", "never recorded");
}
"#;
    let err = run_trace(src, &options(root.path())).unwrap_err();
    match err {
        TraceError::Execution(failure) => {
            assert_eq!(failure.kind, FailureKind::Protocol);
            assert!(failure.message.contains("cannot open"), "{}", failure.message);
        }
        other => panic!("expected execution error, got {other:?}"),
    }
    assert_released(root.path());
}

#[test]
fn runaway_snippet_is_killed_at_the_timeout() {
    let root = tempfile::tempdir().unwrap();
    let src = "struct Spin;\n\nfn main() {\n    loop {\n        std::thread::sleep(std::time::Duration::from_millis(5));\n    }\n}\n";
    let opts = PipelineOptions {
        timeout: Some(Duration::from_millis(500)),
        ..options(root.path())
    };
    let err = run_trace(src, &opts).unwrap_err();
    match err {
        TraceError::Execution(failure) => assert_eq!(failure.kind, FailureKind::Timeout),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_released(root.path());
}

#[test]
fn no_declaration() {
    let root = tempfile::tempdir().unwrap();
    let err = run_trace("fn main() {}\n", &options(root.path())).unwrap_err();
    assert!(matches!(err, TraceError::NoDeclaration));
    assert_released(root.path());
}

#[test]
fn entry_point_on_the_unit() {
    let root = tempfile::tempdir().unwrap();
    let src = r#"struct App;

impl App {
    fn main() {
        let word = "hi";
        let letters: Vec<char> = word.chars().collect();
        btviz_trace::capture_step!("visit", "letters", "letters", letters, "missing", None::<i32>);
    }
}
"#;
    let steps = run_trace(src, &options(root.path())).unwrap();
    assert_released(root.path());
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].function, "main");
    assert_eq!(
        steps[0].variables["letters"],
        TraceValue::List(vec![TraceValue::Char('h'), TraceValue::Char('i')])
    );
    assert_eq!(steps[0].variables["missing"], TraceValue::Null);
}

#[test]
fn uninstrumented_snippet_gives_an_empty_trace() {
    let root = tempfile::tempdir().unwrap();
    let src = "struct Quiet;\n\nfn main() {\n    let _ = 1 + 1;\n}\n";
    let steps = run_trace(src, &options(root.path())).unwrap();
    assert!(steps.is_empty());
    assert_released(root.path());
}

#[test]
fn opaque_values_are_described() {
    let root = tempfile::tempdir().unwrap();
    let src = r#"use btviz_trace::capture_step;

#[derive(Debug)]
struct Board {
    queens: usize,
}

struct NoDebug;

fn main() {
    let board = Board { queens: 4 };
    capture_step!("place", "described", "board", board, "raw", NoDebug, "ratio", 0.5);
}
"#;
    let steps = run_trace(src, &options(root.path())).unwrap();
    assert_released(root.path());
    assert_eq!(
        steps[0].variables["board"],
        TraceValue::Object("Board { queens: 4 }".into())
    );
    assert_eq!(steps[0].variables["raw"], TraceValue::Object("snippet::NoDebug".into()));
    assert_eq!(steps[0].variables["ratio"], TraceValue::Float(0.5));
}
