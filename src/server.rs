//! Host HTTP layer and graceful shutdown.
//!
//! The server accepts connections with hyper (HTTP/1.1 and HTTP/2), collects
//! each request body, and runs the pipeline synchronously on tokio's
//! blocking pool with a fresh [`BufferedResponse`]. Whatever the chain wrote
//! becomes the hyper response.
//!
//! # Faults
//!
//! A panic that no [`Recovery`](crate::middleware::Recovery) stage contained
//! ends the blocking task. The server logs it and answers `500`; the
//! connection and the process stay up.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** or Ctrl-C the server stops accepting, lets every in-flight
//! connection finish, and then returns from [`Server::serve`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::pipeline::Pipeline;
use crate::request::Request;
use crate::response::BufferedResponse;

const DEFAULT_ADDR: &str = "0.0.0.0:3000";

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// ```rust,no_run
    /// use strand::Server;
    /// let server = Server::bind("127.0.0.1:8080");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr }
    }

    /// Binds to `0.0.0.0:$PORT` if `PORT` is set, otherwise `0.0.0.0:3000`.
    ///
    /// # Panics
    ///
    /// Panics if `PORT` is not a valid port number.
    pub fn from_env() -> Self {
        Self::detect(None)
    }

    /// Resolves the address in order: `explicit` if given, then
    /// `0.0.0.0:$PORT`, then `0.0.0.0:3000`.
    ///
    /// # Panics
    ///
    /// Panics if the resolved address is not a valid `host:port` string.
    ///
    /// ```rust,no_run
    /// use strand::Server;
    /// let addr = std::env::args().nth(1);
    /// let server = Server::detect(addr.as_deref());
    /// ```
    pub fn detect(explicit: Option<&str>) -> Self {
        Self::bind(&detect_address(explicit, std::env::var("PORT").ok()))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Locks `pipeline`, then serves it until a shutdown signal arrives and
    /// every in-flight connection has finished.
    pub async fn serve(self, mut pipeline: Pipeline) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;

        // Registration is over once traffic arrives. The Arc shares the frozen
        // chain across connection tasks without copying it.
        pipeline.lock();
        let pipeline = Arc::new(pipeline);

        info!(addr = %self.addr, handlers = pipeline.len(), "strand listening");

        // Every connection task lands in the JoinSet so shutdown can wait for
        // all of them.
        let mut tasks = tokio::task::JoinSet::new();

        // The shutdown future is polled on every loop turn, so it has to stay
        // put in memory. `tokio::pin!` pins it on the stack.
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // `biased` polls the arms top to bottom instead of randomly.
                // Shutdown comes first: a SIGTERM stops accepting at once,
                // even with connections still queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let pipeline = Arc::clone(&pipeline);
                    // TokioIo adapts tokio's AsyncRead/AsyncWrite to hyper's
                    // IO traits.
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // `service_fn` turns an async fn into a hyper Service.
                        // It is called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let pipeline = Arc::clone(&pipeline);
                            async move { dispatch(pipeline, req, remote_addr).await }
                        });

                        // `auto::Builder` serves HTTP/1.1 or HTTP/2, whichever
                        // the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet stays small
                // on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Drain: every in-flight connection finishes before we return.
        while tasks.join_next().await.is_some() {}

        info!("strand stopped");
        Ok(())
    }
}

/// Resolves the listen address: an explicit one wins, then `PORT`, then the
/// default.
fn detect_address(explicit: Option<&str>, port: Option<String>) -> String {
    if let Some(addr) = explicit {
        return addr.to_owned();
    }
    match port {
        Some(port) if !port.is_empty() => format!("0.0.0.0:{port}"),
        _ => DEFAULT_ADDR.to_owned(),
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Collects the body and runs the pipeline. Never fails towards hyper.
async fn dispatch(
    pipeline: Arc<Pipeline>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %remote_addr, "failed to read request body: {e}");
            return Ok(status_only(StatusCode::BAD_REQUEST));
        }
    };

    let request = Request::from(http::Request::from_parts(parts, body)).with_remote_addr(remote_addr);
    Ok(run(pipeline, request).await)
}

/// Runs the chain on the blocking pool; handlers are synchronous and may
/// touch the filesystem.
async fn run(pipeline: Arc<Pipeline>, request: Request) -> http::Response<Full<Bytes>> {
    let method = request.method().clone();
    let path = request.path().to_owned();

    let outcome = tokio::task::spawn_blocking(move || {
        let mut response = BufferedResponse::new();
        pipeline.serve(&mut response, &request);
        response
    })
    .await;

    match outcome {
        Ok(response) => response.into_http(),
        Err(e) => {
            error!(%method, %path, "unrecovered handler failure: {e}");
            status_only(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn status_only(status: StatusCode) -> http::Response<Full<Bytes>> {
    let mut response = http::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on SIGTERM or Ctrl-C (Ctrl-C only off Unix). If a signal handler
/// cannot be installed, that signal is never awaited.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
