//! Instrumentation support linked into every traced snippet.
//!
//! Built per run as the `btviz_trace` rlib with nothing but `std`, so it
//! writes its JSON by hand. Each `capture_step!` call appends one line to the
//! file named by `BTVIZ_TRACE_FILE`:
//!
//! ```text
//! {"action":"swap","details":"swap 0 and 1","variables":[{"type":"str","value":"i"},{"type":"int","value":1}],
//!  "function":"snippet::Demo::solve","line":12,"backtrace":"   0: ..."}
//! ```

use std::any::type_name;
use std::collections::VecDeque;
use std::fmt::{Debug, Display, Write as _};
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::sync::{Mutex, OnceLock};

pub const TRACE_FILE_ENV: &str = "BTVIZ_TRACE_FILE";
pub const CAPTURE_BACKTRACE_ENV: &str = "BTVIZ_CAPTURE_BACKTRACE";
/// Exit status of a snippet whose event file cannot be written.
pub const SINK_FAILURE_EXIT: i32 = 97;

/// Records one step of the running snippet.
///
/// `capture_step!(action, details)` or
/// `capture_step!(action, details, "key", value, "key2", value2)`.
#[macro_export]
macro_rules! capture_step {
    ($action:expr, $details:expr $(, $key:expr, $value:expr)*) => {{
        #[allow(unused_imports)]
        use $crate::{EncodeDebug as _, EncodeOpaque as _, EncodeTagged as _};
        fn __btviz_here() {}
        #[allow(unused_mut)]
        let mut __vars: ::std::vec::Vec<::std::string::String> = ::std::vec::Vec::new();
        $(
            {
                let mut __key = ::std::string::String::new();
                (&&&$crate::Probe(&$key)).encode_tagged(&mut __key);
                __vars.push(__key);
                let mut __value = ::std::string::String::new();
                (&&&$crate::Probe(&$value)).encode_tagged(&mut __value);
                __vars.push(__value);
            }
        )*
        $crate::emit(&$action, &$details, __vars, $crate::caller_of(__btviz_here), line!())
    }};
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

static SINK: OnceLock<Option<Mutex<File>>> = OnceLock::new();

/// The event file, or `None` when the snippet runs outside a trace.
fn sink() -> Option<&'static Mutex<File>> {
    SINK.get_or_init(|| {
        let path = std::env::var_os(TRACE_FILE_ENV)?;
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some(Mutex::new(file)),
            Err(err) => sink_failure(&format!("cannot open {}: {err}", path.to_string_lossy())),
        }
    })
    .as_ref()
}

/// A trace with missing steps must not look complete.
fn sink_failure(reason: &str) -> ! {
    eprintln!("btviz_trace: {reason}");
    std::process::exit(SINK_FAILURE_EXIT)
}

fn backtraces_enabled() -> bool {
    !matches!(std::env::var(CAPTURE_BACKTRACE_ENV).as_deref(), Ok("0"))
}

/// Name of the function a `capture_step!` expanded in, from the type name of
/// a marker fn item declared at the expansion site.
pub fn caller_of<F>(_marker: F) -> &'static str {
    let name = type_name::<F>();
    name.strip_suffix("::__btviz_here").unwrap_or(name)
}

pub fn emit<A, D>(action: &A, details: &D, variables: Vec<String>, function: &str, line: u32)
where
    A: Display + ?Sized,
    D: Display + ?Sized,
{
    let Some(sink) = sink() else {
        return;
    };

    let mut out = String::with_capacity(256);
    out.push_str("{\"action\":");
    json_str(&mut out, &action.to_string());
    out.push_str(",\"details\":");
    json_str(&mut out, &details.to_string());
    out.push_str(",\"variables\":[");
    out.push_str(&variables.join(","));
    out.push_str("],\"function\":");
    json_str(&mut out, function);
    let _ = write!(out, ",\"line\":{line}");
    if backtraces_enabled() {
        out.push_str(",\"backtrace\":");
        json_str(&mut out, &std::backtrace::Backtrace::force_capture().to_string());
    }
    out.push_str("}\n");

    let mut file = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Err(err) = file.write_all(out.as_bytes()).and_then(|()| file.flush()) {
        sink_failure(&format!("cannot write event: {err}"));
    }
}

// ---------------------------------------------------------------------------
// Value encoding
// ---------------------------------------------------------------------------

/// Wrapper that selects the most specific encoding for `T` through
/// autoref: [`Tagged`] types first, then any `Debug` type, then the bare
/// type name.
pub struct Probe<'a, T: ?Sized>(pub &'a T);

pub trait EncodeTagged {
    fn encode_tagged(&self, out: &mut String);
}

pub trait EncodeDebug {
    fn encode_tagged(&self, out: &mut String);
}

pub trait EncodeOpaque {
    fn encode_tagged(&self, out: &mut String);
}

impl<T: Tagged + ?Sized> EncodeTagged for &&Probe<'_, T> {
    fn encode_tagged(&self, out: &mut String) {
        self.0.tagged(out);
    }
}

impl<T: Debug + ?Sized> EncodeDebug for &Probe<'_, T> {
    fn encode_tagged(&self, out: &mut String) {
        object(out, &format!("{:?}", self.0));
    }
}

impl<T: ?Sized> EncodeOpaque for Probe<'_, T> {
    fn encode_tagged(&self, out: &mut String) {
        object(out, type_name::<T>());
    }
}

/// Types with a structured tagged encoding.
pub trait Tagged {
    fn tagged(&self, out: &mut String);
}

fn json_str(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn object(out: &mut String, desc: &str) {
    out.push_str("{\"type\":\"object\",\"value\":");
    json_str(out, desc);
    out.push('}');
}

fn int(out: &mut String, v: i64) {
    let _ = write!(out, "{{\"type\":\"int\",\"value\":{v}}}");
}

macro_rules! tagged_small_int {
    ($($t:ty),*) => {
        $(impl Tagged for $t {
            fn tagged(&self, out: &mut String) {
                int(out, *self as i64);
            }
        })*
    };
}

macro_rules! tagged_wide_int {
    ($($t:ty),*) => {
        $(impl Tagged for $t {
            fn tagged(&self, out: &mut String) {
                match i64::try_from(*self) {
                    Ok(v) => int(out, v),
                    Err(_) => object(out, &self.to_string()),
                }
            }
        })*
    };
}

tagged_small_int!(i8, i16, i32, i64, u8, u16, u32);
tagged_wide_int!(isize, usize, u64, i128, u128);

macro_rules! tagged_float {
    ($($t:ty),*) => {
        $(impl Tagged for $t {
            fn tagged(&self, out: &mut String) {
                if self.is_finite() {
                    let _ = write!(out, "{{\"type\":\"float\",\"value\":{:?}}}", self);
                } else {
                    object(out, &self.to_string());
                }
            }
        })*
    };
}

tagged_float!(f32, f64);

impl Tagged for bool {
    fn tagged(&self, out: &mut String) {
        let _ = write!(out, "{{\"type\":\"bool\",\"value\":{self}}}");
    }
}

impl Tagged for char {
    fn tagged(&self, out: &mut String) {
        out.push_str("{\"type\":\"char\",\"value\":");
        json_str(out, &self.to_string());
        out.push('}');
    }
}

impl Tagged for str {
    fn tagged(&self, out: &mut String) {
        out.push_str("{\"type\":\"str\",\"value\":");
        json_str(out, self);
        out.push('}');
    }
}

impl Tagged for String {
    fn tagged(&self, out: &mut String) {
        self.as_str().tagged(out);
    }
}

impl<T: Tagged> Tagged for Option<T> {
    fn tagged(&self, out: &mut String) {
        match self {
            Some(v) => v.tagged(out),
            None => out.push_str("{\"type\":\"null\"}"),
        }
    }
}

fn list<'a, T: Tagged + 'a>(out: &mut String, items: impl Iterator<Item = &'a T>) {
    out.push_str("{\"type\":\"list\",\"value\":[");
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push(',');
        }
        item.tagged(out);
    }
    out.push_str("]}");
}

impl<T: Tagged> Tagged for [T] {
    fn tagged(&self, out: &mut String) {
        list(out, self.iter());
    }
}

impl<T: Tagged, const N: usize> Tagged for [T; N] {
    fn tagged(&self, out: &mut String) {
        list(out, self.iter());
    }
}

impl<T: Tagged> Tagged for Vec<T> {
    fn tagged(&self, out: &mut String) {
        list(out, self.iter());
    }
}

impl<T: Tagged> Tagged for VecDeque<T> {
    fn tagged(&self, out: &mut String) {
        list(out, self.iter());
    }
}

impl<T: Tagged + ?Sized> Tagged for &T {
    fn tagged(&self, out: &mut String) {
        (**self).tagged(out);
    }
}

impl<T: Tagged + ?Sized> Tagged for &mut T {
    fn tagged(&self, out: &mut String) {
        (**self).tagged(out);
    }
}

impl<T: Tagged + ?Sized> Tagged for Box<T> {
    fn tagged(&self, out: &mut String) {
        (**self).tagged(out);
    }
}
