//! Parsing of rendered native backtraces into raw frames.
//!
//! Both the in-process inspector and the child-process protocol carry the
//! call chain as the text produced by `std::backtrace::Backtrace`'s `Display`
//! impl:
//!
//! ```text
//!    4: snippet::Permutations::permute
//!              at ./Permutations.rs:14:13
//!    5: snippet::main
//!              at ./Permutations.rs:30:5
//! ```
//!
//! Frames come out innermost first, exactly as rendered.

use serde::{Deserialize, Serialize};

/// One symbol of a native call chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFrame {
    /// Demangled symbol path with any hash suffix removed.
    pub symbol: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl RawFrame {
    pub fn new(symbol: impl Into<String>, line: Option<u32>) -> Self {
        RawFrame {
            symbol: normalize_symbol(&symbol.into()),
            file: None,
            line,
        }
    }
}

/// Parses rendered backtrace text. Unrecognized lines are skipped.
pub fn parse_backtrace(text: &str) -> Vec<RawFrame> {
    let mut frames: Vec<RawFrame> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(location) = trimmed.strip_prefix("at ") {
            // Only the first location belongs to the frame's own symbol.
            if let Some(frame) = frames.last_mut() {
                if frame.file.is_none() {
                    let (file, line) = split_location(location);
                    frame.file = Some(file);
                    frame.line = line;
                }
            }
            continue;
        }
        if let Some((index, symbol)) = trimmed.split_once(": ") {
            if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) {
                frames.push(RawFrame {
                    symbol: normalize_symbol(symbol),
                    file: None,
                    line: None,
                });
            }
        }
    }
    frames
}

/// `path/to/file.rs:14:13` -> (`path/to/file.rs`, Some(14)).
fn split_location(location: &str) -> (String, Option<u32>) {
    let mut parts = location.rsplitn(3, ':');
    let col = parts.next();
    let line = parts.next();
    match (parts.next(), line, col) {
        (Some(file), Some(line), Some(_)) => (file.to_string(), line.parse().ok()),
        _ => match location.rsplit_once(':') {
            Some((file, line)) => (file.to_string(), line.parse().ok()),
            None => (location.to_string(), None),
        },
    }
}

/// Strips the `::h0123456789abcdef` disambiguator rustc appends to symbols.
pub fn normalize_symbol(symbol: &str) -> String {
    let symbol = symbol.trim();
    if let Some((head, tail)) = symbol.rsplit_once("::h") {
        if tail.len() == 16 && tail.bytes().all(|b| b.is_ascii_hexdigit()) {
            return head.to_string();
        }
    }
    symbol.to_string()
}

/// Best-effort routine name of a symbol path.
///
/// `snippet::Permutations::permute` -> `permute`,
/// `snippet::solve::{{closure}}` -> `solve`,
/// `<snippet::Board as snippet::Solver>::place` -> `place`.
pub fn short_name(symbol: &str) -> String {
    let mut path = symbol;
    while let Some(rest) = path.strip_suffix("::{{closure}}") {
        path = rest;
    }
    let segment = top_level_segments(path)
        .into_iter()
        .last()
        .unwrap_or(path);
    segment.trim_start_matches('<').trim_end_matches('>').to_string()
}

/// Splits on `::` that are not nested inside `<...>`.
fn top_level_segments(path: &str) -> Vec<&str> {
    let bytes = path.as_bytes();
    let mut segments = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'-' if bytes.get(i + 1) == Some(&b'>') => i += 1,
            b'<' => depth += 1,
            b'>' => depth -= 1,
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                segments.push(&path[start..i]);
                start = i + 2;
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    segments.push(&path[start..]);
    segments.retain(|s| !s.is_empty());
    segments
}

/// Splits a qualified symbol `<Self as Trait>::method` into its self type
/// and trait path. `<Self>::method` has no trait. Reference, pointer and
/// `dyn` qualifiers are removed from the self type.
///
/// Returns `None` for plain paths.
pub fn qualified_parts(symbol: &str) -> Option<(&str, Option<&str>)> {
    let inner = symbol.strip_prefix('<')?;
    let bytes = inner.as_bytes();
    let mut depth = 0i32;
    let mut split = None;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'-' if bytes.get(i + 1) == Some(&b'>') => i += 1,
            b'<' => depth += 1,
            b'>' if depth == 0 => {
                let (self_ty, trait_path) = match split {
                    Some(at) => (&inner[..at], Some(inner[at + 4..i].trim())),
                    None => (&inner[..i], None),
                };
                return Some((strip_qualifiers(self_ty), trait_path));
            }
            b'>' => depth -= 1,
            b' ' if depth == 0 && split.is_none() && inner[i..].starts_with(" as ") => split = Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn strip_qualifiers(mut ty: &str) -> &str {
    loop {
        let next = ty
            .trim_start()
            .trim_start_matches('&');
        let next = ["mut ", "dyn ", "*const ", "*mut "]
            .iter()
            .find_map(|q| next.strip_prefix(q))
            .unwrap_or(next);
        if next.len() == ty.len() {
            return ty.trim();
        }
        ty = next;
    }
}
