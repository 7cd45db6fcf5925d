//! Response tracking wrapper.
//!
//! [`ResponseTracker`] sits between the handlers and the host's raw writer.
//! It remembers the committed status and the number of body bytes, fires
//! before-hooks at commit time, and forwards every optional capability of
//! the wrapped writer unchanged.
//!
//! Commit rules:
//!
//! - The first `write_header` fixes [`Tracker::status`]. Later calls are
//!   still forwarded (the raw writer decides what the client sees) but do
//!   not change the recorded status.
//! - A body write with no status committed commits `200 OK` first.
//! - Before-hooks run once, at the first commit, newest first.

use std::io;

use http::{HeaderMap, StatusCode};

use crate::error::Error;
use crate::writer::{
    BeforeHook, CloseNotify, Connection, Flush, Hijack, ResponseWriter, Tracker,
};

/// Tracks status, size and commit state of one response.
///
/// Created by [`Pipeline::serve`](crate::Pipeline::serve) for the outermost
/// pipeline of a request and reused by any nested pipeline. It borrows the
/// raw writer for the duration of the request and must not outlive it.
pub struct ResponseTracker<'a> {
    inner: &'a mut dyn ResponseWriter,
    status: Option<StatusCode>,
    size: usize,
    before: Vec<BeforeHook>,
}

impl<'a> ResponseTracker<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter) -> Self {
        Self { inner, status: None, size: 0, before: Vec::new() }
    }

    fn run_before_hooks(&mut self) {
        let hooks = std::mem::take(&mut self.before);
        for hook in hooks.into_iter().rev() {
            hook(&mut *self);
        }
    }
}

impl ResponseWriter for ResponseTracker<'_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
            self.run_before_hooks();
        }
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.written() {
            self.write_header(StatusCode::OK);
        }
        let n = self.inner.write(buf)?;
        self.size += n;
        Ok(n)
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        self.inner.flusher()
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        self.inner.hijacker()
    }

    fn close_notifier(&mut self) -> Option<&mut dyn CloseNotify> {
        self.inner.close_notifier()
    }

    fn tracker(&mut self) -> Option<&mut dyn Tracker> {
        Some(self)
    }
}

impl Tracker for ResponseTracker<'_> {
    fn status(&self) -> Option<StatusCode> {
        self.status
    }

    fn size(&self) -> usize {
        self.size
    }

    fn before(&mut self, hook: BeforeHook) {
        self.before.push(hook);
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.flusher() {
            Some(flusher) => flusher.flush(),
            None => Ok(()),
        }
    }

    fn hijack(&mut self) -> Result<Box<dyn Connection>, Error> {
        let hijacker = self.inner.hijacker().ok_or(Error::HijackUnsupported)?;
        Ok(hijacker.hijack()?)
    }
}
