//! The pipeline entry point.
//!
//! A [`Pipeline`] owns the ordered handler list and the chain derived from
//! it. Registration order is execution order. Every successful append
//! rebuilds the whole chain and replaces the old one, so the chain always
//! matches the handler list exactly.
//!
//! Registration takes `&mut self` and serving takes `&self`: once a pipeline
//! is shared with the server it can no longer change. [`Pipeline::lock`]
//! makes the same freeze explicit for callers that keep ownership.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::chain::{self, Next, Node};
use crate::error::Error;
use crate::handler::{BoxedHandler, Endpoint, Handler, PassThrough};
use crate::middleware::{Logger, Recovery, Static};
use crate::request::Request;
use crate::tracker::ResponseTracker;
use crate::writer::ResponseWriter;

/// An ordered chain of middleware.
///
/// ```rust
/// use strand::{BufferedResponse, Pipeline, Request, ResponseWriter, StatusCode};
///
/// # fn main() -> Result<(), strand::Error> {
/// let mut pipeline = Pipeline::new();
/// pipeline
///     .append_fn(|w, req, next| {
///         if req.header("authorization").is_none() {
///             w.write_header(StatusCode::UNAUTHORIZED);
///             return;
///         }
///         next.run(w, req);
///     })?
///     .append_endpoint(|w: &mut dyn ResponseWriter, _req: &Request| {
///         if let Err(e) = w.write(b"hello") {
///             tracing::warn!(error = %e, "write failed");
///         }
///     })?;
///
/// let mut res = BufferedResponse::new();
/// let req = Request::from(http::Request::get("/").body(bytes::Bytes::new()).unwrap());
/// pipeline.serve(&mut res, &req);
/// assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    handlers: Vec<BoxedHandler>,
    chain: Node,
    locked: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { handlers: Vec::new(), chain: Node::sentinel(), locked: false }
    }

    /// Builds a pipeline from an ordered list of handlers in one go.
    pub fn from_handlers(handlers: Vec<BoxedHandler>) -> Self {
        let chain = chain::build(&handlers);
        Self { handlers, chain, locked: false }
    }

    /// The conventional stack: panic recovery, request logging, then static
    /// files from `./static`.
    pub fn classic() -> Self {
        Self::from_handlers(vec![
            Arc::new(Recovery::new()),
            Arc::new(Logger::new()),
            Arc::new(Static::new("static")),
        ])
    }

    /// Appends a handler to the end of the chain.
    pub fn append(&mut self, handler: impl Handler) -> Result<&mut Self, Error> {
        let handler: BoxedHandler = Arc::new(handler);
        self.try_append(Some(handler))
    }

    /// Appends a closure handler. Same as [`append`](Self::append), but the
    /// closure's argument types are inferred.
    pub fn append_fn<F>(&mut self, f: F) -> Result<&mut Self, Error>
    where
        F: Fn(&mut dyn ResponseWriter, &Request, Next<'_>) + Send + Sync + 'static,
    {
        self.append(f)
    }

    /// Appends a plain endpoint. The chain always continues after it returns.
    pub fn append_endpoint(&mut self, endpoint: impl Endpoint) -> Result<&mut Self, Error> {
        self.append(PassThrough(endpoint))
    }

    /// Appends an already boxed handler, if there is one.
    ///
    /// `None` is rejected with [`Error::EmptyHandler`]; a locked pipeline
    /// rejects everything with [`Error::Locked`]. A rejected call leaves the
    /// handler list unchanged.
    pub fn try_append(&mut self, handler: Option<BoxedHandler>) -> Result<&mut Self, Error> {
        let Some(handler) = handler else {
            warn!("rejected empty handler");
            return Err(Error::EmptyHandler);
        };
        if self.locked {
            warn!(handlers = self.handlers.len(), "rejected handler on locked pipeline");
            return Err(Error::Locked);
        }

        self.handlers.push(handler);
        self.chain = chain::build(&self.handlers);
        debug!(handlers = self.handlers.len(), "middleware chain rebuilt");
        Ok(self)
    }

    /// Freezes the handler list. Further appends fail with [`Error::Locked`].
    pub fn lock(&mut self) -> &mut Self {
        self.locked = true;
        self
    }

    pub fn is_locked(&self) -> bool { self.locked }
    pub fn len(&self) -> usize { self.handlers.len() }
    pub fn is_empty(&self) -> bool { self.handlers.is_empty() }
    pub fn handlers(&self) -> &[BoxedHandler] { &self.handlers }

    /// Runs one request through the chain.
    ///
    /// The outermost pipeline wraps `w` in a fresh [`ResponseTracker`]. If `w`
    /// already is a tracker (this pipeline is nested inside another one), it
    /// is used as is, so status and size accounting carry across both.
    pub fn serve(&self, w: &mut dyn ResponseWriter, req: &Request) {
        if w.tracker().is_some() {
            self.chain.serve(w, req);
        } else {
            let mut tracked = ResponseTracker::new(w);
            self.chain.serve(&mut tracked, req);
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self { Self::new() }
}

/// Mounting: a pipeline appended to another pipeline runs as a sub-pipeline.
impl Endpoint for Pipeline {
    fn call(&self, w: &mut dyn ResponseWriter, req: &Request) {
        self.serve(w, req);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::StatusCode;

    use super::*;
    use crate::response::BufferedResponse;
    use crate::writer::Tracker;

    fn request() -> Request {
        Request::from(http::Request::get("/").body(bytes::Bytes::new()).unwrap())
    }

    #[test]
    fn starts_empty_and_unlocked() {
        let pipeline = Pipeline::new();
        assert!(pipeline.is_empty());
        assert!(!pipeline.is_locked());

        let mut w = BufferedResponse::new();
        pipeline.serve(&mut w, &request());
        assert!(w.body().is_empty());
    }

    #[test]
    fn append_grows_the_handler_list() {
        let mut pipeline = Pipeline::new();
        pipeline.append_fn(|w, _req, _next| w.write_header(StatusCode::OK)).unwrap();
        assert_eq!(pipeline.len(), 1);

        // The stored handler behaves like the one registered.
        let mut w = BufferedResponse::new();
        pipeline.handlers()[0].handle(&mut w, &request(), Next::end());
        assert_eq!(w.status(), StatusCode::OK);
    }

    #[test]
    fn empty_handler_is_rejected() {
        let mut pipeline = Pipeline::new();
        pipeline.append_fn(|_w, _req, _next| {}).unwrap();

        assert!(matches!(pipeline.try_append(None), Err(Error::EmptyHandler)));
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn locked_pipeline_rejects_appends() {
        let mut pipeline = Pipeline::new();
        pipeline.append_fn(|w, req, next| next.run(w, req)).unwrap();
        pipeline.lock();

        let err = pipeline.append_fn(|_w, _req, _next| {}).err();
        assert!(matches!(err, Some(Error::Locked)));
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn endpoints_always_continue() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();

        let first = Arc::clone(&hits);
        let second = Arc::clone(&hits);
        pipeline
            .append_endpoint(move |_w: &mut dyn ResponseWriter, _req: &Request| {
                first.lock().unwrap().push("endpoint");
            })
            .unwrap()
            .append_fn(move |_w, _req, _next| second.lock().unwrap().push("after"))
            .unwrap();

        pipeline.serve(&mut BufferedResponse::new(), &request());
        assert_eq!(*hits.lock().unwrap(), ["endpoint", "after"]);
    }

    #[test]
    fn outermost_pipeline_installs_a_tracker() {
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        let mut pipeline = Pipeline::new();
        pipeline
            .append_fn(move |w, _req, _next| {
                w.write(b"12345").unwrap();
                *slot.lock().unwrap() = w.tracker().map(|t| (t.status(), t.size()));
            })
            .unwrap();

        pipeline.serve(&mut BufferedResponse::new(), &request());
        assert_eq!(*seen.lock().unwrap(), Some((Some(StatusCode::OK), 5)));
    }

    #[test]
    fn nested_pipeline_reuses_the_tracker() {
        let mut raw = BufferedResponse::new();
        let mut outer = ResponseTracker::new(&mut raw);
        outer.write(b"abc").unwrap();

        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        let mut inner = Pipeline::new();
        inner
            .append_fn(move |w, _req, _next| {
                *slot.lock().unwrap() = w.tracker().map(|t| t.size());
                w.write(b"defg").unwrap();
            })
            .unwrap();

        inner.serve(&mut outer, &request());

        assert_eq!(*seen.lock().unwrap(), Some(3));
        assert_eq!(outer.size(), 7);
        assert_eq!(outer.status(), Some(StatusCode::OK));
    }

    #[test]
    fn classic_stack_has_three_stages() {
        assert_eq!(Pipeline::classic().len(), 3);
    }
}
