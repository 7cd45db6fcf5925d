//! Panic recovery.
//!
//! [`Recovery`] runs the rest of the chain inside a panic boundary. A panic
//! raised by any downstream handler is caught, logged with its stack trace,
//! optionally echoed into the response body, and answered with
//! `500 Internal Server Error`.
//!
//! The boundary covers exactly the continuation call. Panics raised before
//! `Recovery` in the chain, or by a pipeline that has no `Recovery` at all,
//! propagate to the host as usual.
//!
//! # Stack traces
//!
//! By the time `catch_unwind` returns, the panicking frames are gone. A
//! process-wide panic hook, installed on first use, captures the trace at
//! the panic site while a recovery boundary is active on the current thread.
//! Outside a boundary the previously installed hook runs unchanged.
//!
//! The hook stores the trace alongside the panic message. A panic re-raised
//! with [`resume_unwind`](std::panic::resume_unwind) skips the hook, so a
//! stored trace is only used when its message matches the payload that
//! reached the boundary. Otherwise the trace is taken at the recovery site.
//!
//! # Late panics
//!
//! If the panicking handler had already started the body, the status is
//! committed and the 500 cannot replace it: the client sees the original
//! status followed by whatever was written. The panic is still logged.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use http::StatusCode;
use tracing::{error, warn};

use crate::chain::Next;
use crate::handler::Handler;
use crate::request::Request;
use crate::writer::ResponseWriter;

/// Recovery behaviour.
#[derive(Clone, Debug)]
pub struct RecoveryConfig {
    /// Write the panic message and stack trace into the response body.
    /// Turn off in production to avoid leaking internals.
    pub expose_stack_trace: bool,
    /// Keep every captured frame, including the panic runtime's own frames
    /// at the top of the trace. When off, those frames are trimmed so the
    /// trace starts at the code that panicked. Only the panicking thread's
    /// stack is available.
    pub stack_all: bool,
    /// Upper bound, in bytes, on the reported stack trace.
    pub stack_size: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self { expose_stack_trace: true, stack_all: false, stack_size: 8 * 1024 }
    }
}

/// Middleware that turns downstream panics into `500` responses.
#[derive(Debug)]
pub struct Recovery {
    config: RecoveryConfig,
}

impl Recovery {
    pub fn new() -> Self {
        Self::with_config(RecoveryConfig::default())
    }

    pub fn with_config(config: RecoveryConfig) -> Self {
        install_panic_hook();
        Self { config }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    fn render_stack(&self, trace: String) -> String {
        let trace = if self.config.stack_all { trace } else { trim_runtime_frames(&trace) };
        truncate(trace, self.config.stack_size)
    }
}

impl Default for Recovery {
    fn default() -> Self { Self::new() }
}

impl Handler for Recovery {
    fn handle(&self, w: &mut dyn ResponseWriter, req: &Request, next: Next<'_>) {
        let Err(payload) = guarded(|| next.run(w, req)) else {
            return;
        };

        let message = panic_message(&*payload);
        let trace = take_panic_trace(message).unwrap_or_else(|| Backtrace::force_capture().to_string());
        let stack = self.render_stack(trace);

        error!(
            method = %req.method(),
            path = %req.path(),
            panic = %message,
            stack = %stack,
            "recovered from panic"
        );

        w.write_header(StatusCode::INTERNAL_SERVER_ERROR);

        if self.config.expose_stack_trace {
            let report = format!("PANIC: {message}\n{stack}");
            if let Err(e) = w.write(report.as_bytes()) {
                warn!(error = %e, "failed to write panic report");
            }
        }
    }
}

// ── Panic boundary ────────────────────────────────────────────────────────────

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    static PANIC_TRACE: RefCell<Option<CapturedPanic>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// A trace recorded by the panic hook, keyed by the panic's message.
struct CapturedPanic {
    message: String,
    trace: String,
}

fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let guarded = GUARD_DEPTH.try_with(Cell::get).unwrap_or(0) > 0;
            if !guarded {
                previous(info);
                return;
            }
            let captured = CapturedPanic {
                message: panic_message(info.payload()).to_owned(),
                trace: Backtrace::force_capture().to_string(),
            };
            let _ = PANIC_TRACE.try_with(|slot| *slot.borrow_mut() = Some(captured));
        }));
    });
}

/// Runs `f`, catching any panic. While `f` runs, the panic hook records the
/// trace for this thread instead of delegating to the previous hook.
fn guarded<F: FnOnce()>(f: F) -> Result<(), Box<dyn Any + Send>> {
    PANIC_TRACE.with(|slot| slot.borrow_mut().take());
    GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    GUARD_DEPTH.with(|depth| depth.set(depth.get() - 1));
    outcome
}

/// The trace recorded for the panic carrying `message`, if the hook saw it.
/// A trace left behind by a different panic is discarded.
fn take_panic_trace(message: &str) -> Option<String> {
    let captured = PANIC_TRACE.with(|slot| slot.borrow_mut().take())?;
    (captured.message == message).then_some(captured.trace)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

// ── Trace formatting ──────────────────────────────────────────────────────────

/// Symbol prefixes of frames that belong to the panic machinery rather than
/// to the code that panicked.
const RUNTIME_FRAMES: &[&str] = &[
    "std::backtrace",
    "std::panicking",
    "std::panic::",
    "std::sys::",
    "std::rt::",
    "core::panicking",
    "rust_begin_unwind",
    "__rustc::",
    "<alloc::boxed::Box",
    module_path!(),
];

/// Drops the leading runtime frames from a rendered [`Backtrace`].
fn trim_runtime_frames(trace: &str) -> String {
    let first_user_frame = trace.lines().position(|line| {
        frame_symbol(line).is_some_and(|sym| !RUNTIME_FRAMES.iter().any(|p| sym.starts_with(p)))
    });
    match first_user_frame {
        Some(start) => trace.lines().skip(start).collect::<Vec<_>>().join("\n"),
        None => trace.to_owned(),
    }
}

/// The symbol of a frame header line such as `  12: my_app::handler`.
fn frame_symbol(line: &str) -> Option<&str> {
    let (index, symbol) = line.trim_start().split_once(": ")?;
    (!index.is_empty() && index.bytes().all(|b| b.is_ascii_digit())).then_some(symbol)
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = "   0: std::backtrace::Backtrace::force_capture
             at /rustc/library/std/src/backtrace.rs:312:9
   1: strand::middleware::recovery::install_panic_hook::{{closure}}
   2: std::panicking::rust_panic_with_hook
   3: core::panicking::panic_fmt
   4: my_app::handlers::explode
             at ./src/handlers.rs:10:5
   5: strand::chain::Node::serve";

    #[test]
    fn trims_leading_runtime_frames() {
        let trimmed = trim_runtime_frames(TRACE);
        assert!(trimmed.starts_with("   4: my_app::handlers::explode"));
        assert!(trimmed.ends_with("strand::chain::Node::serve"));
    }

    #[test]
    fn keeps_unrecognised_traces() {
        assert_eq!(trim_runtime_frames("disabled backtrace"), "disabled backtrace");
    }

    #[test]
    fn stack_all_keeps_every_frame() {
        let rec = Recovery::with_config(RecoveryConfig { stack_all: true, ..Default::default() });
        assert_eq!(rec.render_stack(TRACE.to_owned()), TRACE);
    }

    #[test]
    fn stack_is_bounded() {
        let rec = Recovery::with_config(RecoveryConfig { stack_size: 16, ..Default::default() });
        assert_eq!(rec.render_stack(TRACE.to_owned()).len(), 16);
        assert_eq!(truncate("héllo".to_owned(), 2), "h");
    }

    #[test]
    fn extracts_panic_messages() {
        let from_str: Box<dyn Any + Send> = Box::new("static message");
        let from_string: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        let opaque: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*from_str), "static message");
        assert_eq!(panic_message(&*from_string), "owned message");
        assert_eq!(panic_message(&*opaque), "non-string panic payload");
    }

    #[test]
    fn guarded_captures_the_panic_site_trace() {
        install_panic_hook();
        let outcome = guarded(|| panic!("boom"));
        assert!(outcome.is_err());
        assert!(take_panic_trace("boom").is_some());
        assert!(take_panic_trace("boom").is_none());
    }

    #[test]
    fn formatted_messages_match_the_hook_record() {
        install_panic_hook();
        let code = 7;
        let payload = guarded(|| panic!("code {code}")).unwrap_err();
        assert!(take_panic_trace(panic_message(&*payload)).is_some());
    }

    #[test]
    fn resumed_panics_do_not_reuse_a_stale_trace() {
        install_panic_hook();
        let payload = guarded(|| {
            let first = panic::catch_unwind(|| panic!("first"));
            assert!(first.is_err());
            panic::resume_unwind(Box::new("second"));
        })
        .unwrap_err();

        assert_eq!(panic_message(&*payload), "second");
        assert!(take_panic_trace("second").is_none());
        // The stale record is consumed, not left for the next panic.
        assert!(take_panic_trace("first").is_none());
    }

    #[test]
    fn defaults_match_development_settings() {
        let config = Recovery::new().config().clone();
        assert!(config.expose_stack_trace);
        assert!(!config.stack_all);
        assert_eq!(config.stack_size, 8192);
    }
}
