//! The response-sink contract and its optional capabilities.
//!
//! A host HTTP layer hands the pipeline something that implements
//! [`ResponseWriter`]. Beyond the three required operations, a writer may
//! expose extra capabilities (flushing, hijacking the connection, close
//! notification). Each one is probed independently through an accessor that
//! returns `Option<&mut dyn Capability>`:
//!
//! ```rust
//! use strand::{Flush, ResponseWriter};
//!
//! fn stream_chunk(w: &mut dyn ResponseWriter, chunk: &[u8]) -> std::io::Result<()> {
//!     w.write(chunk)?;
//!     if let Some(flusher) = w.flusher() {
//!         flusher.flush()?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Writers never pretend to support a capability they lack: a `None` means
//! the caller must take another route.

use std::io::{self, Read, Write};

use http::{HeaderMap, StatusCode};
use tokio::sync::watch;

use crate::error::Error;

/// The response sink every handler writes to.
pub trait ResponseWriter {
    /// Response headers. Changes are only visible to the client if made
    /// before the status is committed.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commits the response status.
    fn write_header(&mut self, status: StatusCode);

    /// Writes body bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        None
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        None
    }

    fn close_notifier(&mut self) -> Option<&mut dyn CloseNotify> {
        None
    }

    /// Status/size observation, present once a pipeline has wrapped the
    /// writer in a [`ResponseTracker`](crate::ResponseTracker).
    fn tracker(&mut self) -> Option<&mut dyn Tracker> {
        None
    }
}

/// Pushes buffered response data to the client.
pub trait Flush {
    fn flush(&mut self) -> io::Result<()>;
}

/// A raw, bidirectional connection taken over from the HTTP layer.
pub trait Connection: Read + Write + Send {}

impl<T: Read + Write + Send> Connection for T {}

/// Hands the underlying connection over to the caller.
///
/// After a successful hijack the HTTP layer no longer manages the
/// connection; the caller owns its lifetime.
pub trait Hijack {
    fn hijack(&mut self) -> io::Result<Box<dyn Connection>>;
}

/// Signals when the client goes away before the response completes.
///
/// The receiver observes `true` once the peer has disconnected.
pub trait CloseNotify {
    fn close_notify(&mut self) -> watch::Receiver<bool>;
}

/// A callback fired once, immediately before the status is committed.
pub type BeforeHook = Box<dyn FnOnce(&mut dyn ResponseWriter)>;

/// Observation and hook registration on a tracked response.
pub trait Tracker {
    /// The committed status, or `None` if nothing has been committed yet.
    fn status(&self) -> Option<StatusCode>;

    /// Body bytes written so far.
    fn size(&self) -> usize;

    fn written(&self) -> bool {
        self.status().is_some()
    }

    /// Registers `hook` to run just before the first status commit.
    ///
    /// Hooks run last-registered-first. A hook registered after the commit
    /// never runs.
    fn before(&mut self, hook: BeforeHook);

    /// Flushes the underlying writer, or does nothing if it cannot flush.
    fn flush(&mut self) -> io::Result<()>;

    /// Takes over the underlying connection.
    fn hijack(&mut self) -> Result<Box<dyn Connection>, Error>;
}
