//! Static file serving.

use std::fs;
use std::path::{Path, PathBuf};

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, Method, StatusCode};
use tracing::{debug, warn};

use crate::chain::Next;
use crate::handler::Handler;
use crate::request::Request;
use crate::writer::ResponseWriter;

/// Serves files below a root directory.
///
/// Only `GET` and `HEAD` are answered. Any other method, a path outside the
/// configured prefix, a `..` segment, or a file that does not exist falls
/// through to the rest of the chain untouched. Directories are served
/// through their index file.
///
/// ```rust,no_run
/// use strand::{Pipeline, middleware::Static};
///
/// # fn main() -> Result<(), strand::Error> {
/// let mut pipeline = Pipeline::new();
/// pipeline.append(Static::new("public").with_prefix("/assets"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Static {
    root: PathBuf,
    prefix: String,
    index: String,
}

impl Static {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), prefix: String::new(), index: "index.html".to_owned() }
    }

    /// Only serve request paths under `prefix`, which is stripped before the
    /// file lookup.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// File served for a directory. Defaults to `index.html`.
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }

        let mut file = self.root.clone();
        for segment in rest.split('/').filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." || segment.contains('\\') {
                return None;
            }
            file.push(segment);
        }
        if file.is_dir() {
            file.push(&self.index);
        }
        file.is_file().then_some(file)
    }
}

impl Handler for Static {
    fn handle(&self, w: &mut dyn ResponseWriter, req: &Request, next: Next<'_>) {
        let head = *req.method() == Method::HEAD;
        if *req.method() != Method::GET && !head {
            return next.run(w, req);
        }
        let Some(file) = self.resolve(req.path()) else {
            return next.run(w, req);
        };
        let contents = match fs::read(&file) {
            Ok(contents) => contents,
            Err(e) => {
                debug!(file = %file.display(), error = %e, "static file unreadable");
                return next.run(w, req);
            }
        };

        let headers = w.headers_mut();
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type(&file)));
        }
        headers.insert(CONTENT_LENGTH, HeaderValue::from(contents.len()));
        w.write_header(StatusCode::OK);

        if !head {
            if let Err(e) = w.write(&contents) {
                warn!(file = %file.display(), error = %e, "static file write failed");
            }
        }
    }
}

fn content_type(path: &Path) -> &'static str {
    let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("css")          => "text/css; charset=utf-8",
        Some("csv")          => "text/csv",
        Some("gif")          => "image/gif",
        Some("htm" | "html") => "text/html; charset=utf-8",
        Some("ico")          => "image/x-icon",
        Some("jpeg" | "jpg") => "image/jpeg",
        Some("js" | "mjs")   => "text/javascript; charset=utf-8",
        Some("json")         => "application/json",
        Some("pdf")          => "application/pdf",
        Some("png")          => "image/png",
        Some("svg")          => "image/svg+xml",
        Some("txt")          => "text/plain; charset=utf-8",
        Some("wasm")         => "application/wasm",
        Some("webp")         => "image/webp",
        Some("xml")          => "application/xml",
        _                    => "application/octet-stream",
    }
}
