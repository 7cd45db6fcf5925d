//! Minimal strand example: recovery, logging, a token check and an echo.
//!
//! Run with:
//!   PORT=3000 cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/hello                      # 401
//!   curl -i -H 'authorization: token' -d 'hi' localhost:3000 # 200, echoes "hi"
//!   curl -i -H 'authorization: token' localhost:3000/boom    # 500, recovered

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use http::HeaderValue;
use http::header::CONTENT_TYPE;
use strand::middleware::{Logger, Recovery, RecoveryConfig};
use strand::{Next, Pipeline, Request, ResponseWriter, Server, StatusCode};
use tracing::warn;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let served = Arc::new(AtomicUsize::new(0));
    let app = build(Arc::clone(&served)).expect("pipeline setup");

    Server::from_env()
        .serve(app)
        .await
        .expect("server error");

    println!("served {} authorised requests", served.load(Ordering::Relaxed));
}

fn build(served: Arc<AtomicUsize>) -> Result<Pipeline, strand::Error> {
    let mut app = Pipeline::new();
    app.append(Recovery::with_config(RecoveryConfig { expose_stack_trace: false, ..Default::default() }))?
        .append(Logger::new())?
        .append_fn(require_auth)?
        .append_fn(explode_on_boom)?
        .append_endpoint(move |w: &mut dyn ResponseWriter, req: &Request| {
            served.fetch_add(1, Ordering::Relaxed);
            echo(w, req);
        })?;
    Ok(app)
}

// Rejects requests without an Authorization header. Never calls `next`, so
// nothing downstream runs.
fn require_auth(w: &mut dyn ResponseWriter, req: &Request, next: Next<'_>) {
    if req.header("authorization").is_none() {
        w.write_header(StatusCode::UNAUTHORIZED);
        return;
    }
    next.run(w, req);
}

fn explode_on_boom(w: &mut dyn ResponseWriter, req: &Request, next: Next<'_>) {
    if req.path() == "/boom" {
        panic!("boom requested");
    }
    next.run(w, req);
}

fn echo(w: &mut dyn ResponseWriter, req: &Request) {
    w.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    let body: &[u8] = if req.body().is_empty() { req.path().as_bytes() } else { req.body() };
    if let Err(e) = w.write(body) {
        warn!(error = %e, "echo write failed");
    }
}
