//! Handler traits and type erasure.
//!
//! # Two handler shapes
//!
//! A [`Handler`] is a full pipeline stage: it sees the response writer, the
//! request and the continuation [`Next`], and decides whether, when and
//! around what the rest of the chain runs.
//!
//! An [`Endpoint`] is the plain "write a response" shape with no
//! continuation. When appended to a pipeline it is adapted into a handler
//! that always continues once it returns, so an endpoint can never
//! short-circuit the chain.
//!
//! Both are blanket-implemented for closures of the right signature, and
//! both can be implemented by hand on structs that carry configuration:
//!
//! ```text
//! |w, req, next| { … }       ← closure / struct implementing Handler
//!        ↓ pipeline.append(..)
//! Arc<dyn Handler>            ← BoxedHandler, shared by every chain rebuild
//!        ↓ per request
//! handler.handle(w, req, next) ← one vtable dispatch per stage
//! ```

use std::sync::Arc;

use crate::chain::Next;
use crate::request::Request;
use crate::writer::ResponseWriter;

/// A pipeline stage with explicit continuation.
///
/// Call `next.run(w, req)` to hand over to the rest of the chain. Not calling
/// it short-circuits the pipeline; code placed after it runs on the way out.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, w: &mut dyn ResponseWriter, req: &Request, next: Next<'_>);
}

/// A type-erased handler shared between the handler list and the chain.
pub type BoxedHandler = Arc<dyn Handler>;

impl<F> Handler for F
where
    F: Fn(&mut dyn ResponseWriter, &Request, Next<'_>) + Send + Sync + 'static,
{
    fn handle(&self, w: &mut dyn ResponseWriter, req: &Request, next: Next<'_>) {
        self(w, req, next)
    }
}

/// A plain request handler without a continuation.
pub trait Endpoint: Send + Sync + 'static {
    fn call(&self, w: &mut dyn ResponseWriter, req: &Request);
}

impl<F> Endpoint for F
where
    F: Fn(&mut dyn ResponseWriter, &Request) + Send + Sync + 'static,
{
    fn call(&self, w: &mut dyn ResponseWriter, req: &Request) {
        self(w, req)
    }
}

/// Adapts an [`Endpoint`] into a [`Handler`] that always continues.
pub(crate) struct PassThrough<E>(pub(crate) E);

impl<E: Endpoint> Handler for PassThrough<E> {
    fn handle(&self, w: &mut dyn ResponseWriter, req: &Request, next: Next<'_>) {
        self.0.call(w, req);
        next.run(w, req);
    }
}

/// The sentinel's handler.
pub(crate) struct Noop;

impl Handler for Noop {
    fn handle(&self, _w: &mut dyn ResponseWriter, _req: &Request, _next: Next<'_>) {}
}
