//! In-memory response writer.
//!
//! [`BufferedResponse`] is the sink the bundled [`Server`](crate::Server)
//! hands to the pipeline: the chain writes into it synchronously, and the
//! buffered status, headers and body become one hyper response afterwards.
//! It doubles as a recorder in tests.

use std::io;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use tracing::warn;

use crate::writer::{Flush, ResponseWriter};

/// A response collected in memory.
///
/// Behaves like a conventional HTTP server writer: the first `write_header`
/// wins and later ones are ignored with a warning, and a body write without a
/// status commits `200 OK`. Supports [`Flush`] (flushes are counted, there is
/// nothing to push). Hijacking and close notification are not supported.
#[derive(Debug, Default)]
pub struct BufferedResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
    flushes: usize,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed status, `200 OK` if nothing was committed.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn flushes(&self) -> usize { self.flushes }

    /// Converts into a hyper-ready response. `content-length` is derived by
    /// hyper from the full body.
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let status = self.status();
        let mut response = http::Response::new(Full::new(self.body.freeze()));
        *response.status_mut() = status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl ResponseWriter for BufferedResponse {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        match self.status {
            Some(committed) => {
                warn!(%committed, ignored = %status, "superfluous write_header call");
            }
            None => self.status = Some(status),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        Some(self)
    }
}

impl Flush for BufferedResponse {
    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}
