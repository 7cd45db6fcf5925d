//! Per-request logging.

use std::time::Instant;

use tracing::info;

use crate::chain::Next;
use crate::handler::Handler;
use crate::request::Request;
use crate::writer::ResponseWriter;

/// Logs each request on the way in and its outcome on the way out.
///
/// The outcome is read from the response tracker after the rest of the chain
/// has returned; a request that never committed a status is reported as `0`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Logger;

impl Logger {
    pub fn new() -> Self {
        Self
    }
}

impl Handler for Logger {
    fn handle(&self, w: &mut dyn ResponseWriter, req: &Request, next: Next<'_>) {
        let start = Instant::now();
        info!(method = %req.method(), path = %req.path(), "request started");

        next.run(w, req);

        let status = w.tracker().and_then(|t| t.status());
        info!(
            method = %req.method(),
            path = %req.path(),
            status = status.map_or(0, |s| s.as_u16()),
            reason = status.and_then(|s| s.canonical_reason()).unwrap_or(""),
            elapsed = ?start.elapsed(),
            "request completed"
        );
    }
}
