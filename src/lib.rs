//! # strand
//!
//! A request pipeline for HTTP servers: an ordered chain of middleware where
//! every stage sees the response, the request, and an explicit continuation
//! for the rest of the chain.
//!
//! ## The model
//!
//! - **Handlers** decide. Call `next.run(w, req)` to continue, skip it to
//!   short-circuit, or put work on both sides of it to wrap everything
//!   downstream. Stages run in registration order on the way in and in
//!   reverse on the way out.
//! - **The tracker** observes. Each request's writer is wrapped once in a
//!   [`ResponseTracker`] that records the committed status and body size and
//!   fires before-hooks at commit time. Nested pipelines reuse it.
//! - **Recovery** contains. [`middleware::Recovery`] turns a panic anywhere
//!   downstream of it into a logged `500`.
//!
//! What the HTTP layer underneath already owns, strand does not touch:
//! routing by path, load balancing, connection-level protocol handling.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use strand::middleware::{Logger, Recovery};
//! use strand::{Pipeline, Request, ResponseWriter, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), strand::Error> {
//!     let mut app = Pipeline::new();
//!     app.append(Recovery::new())?
//!         .append(Logger::new())?
//!         .append_fn(|w, req, next| {
//!             if req.header("authorization").is_none() {
//!                 w.write_header(StatusCode::UNAUTHORIZED);
//!                 return;
//!             }
//!             next.run(w, req);
//!         })?
//!         .append_endpoint(|w: &mut dyn ResponseWriter, req: &Request| {
//!             if let Err(e) = w.write(req.body()) {
//!                 tracing::warn!(error = %e, "echo write failed");
//!             }
//!         })?;
//!
//!     Server::from_env().serve(app).await
//! }
//! ```

mod chain;
mod error;
mod handler;
mod pipeline;
mod request;
mod response;
mod server;
mod tracker;
mod writer;

pub mod middleware;

pub use chain::Next;
pub use error::Error;
pub use handler::{BoxedHandler, Endpoint, Handler};
pub use pipeline::Pipeline;
pub use request::Request;
pub use response::BufferedResponse;
pub use server::Server;
pub use tracker::ResponseTracker;
pub use writer::{BeforeHook, CloseNotify, Connection, Flush, Hijack, ResponseWriter, Tracker};

pub use http::{HeaderMap, Method, StatusCode};
