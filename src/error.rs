//! Unified error type.

use std::io;

use thiserror::Error;

/// The error type returned by strand's fallible operations.
///
/// Handler-level failures (401, 404, a recovered panic) are expressed by
/// writing to the [`ResponseWriter`](crate::ResponseWriter), not as `Error`s.
/// This type surfaces registration mistakes, missing sink capabilities and
/// infrastructure failures such as binding to a port.
#[derive(Debug, Error)]
pub enum Error {
    /// An empty handler was offered to [`Pipeline::try_append`](crate::Pipeline::try_append).
    #[error("handler cannot be empty")]
    EmptyHandler,

    /// A handler was appended after [`Pipeline::lock`](crate::Pipeline::lock).
    #[error("pipeline is locked; register handlers before serving")]
    Locked,

    /// The underlying response writer cannot hand over its connection.
    #[error("the response writer does not support hijacking")]
    HijackUnsupported,

    #[error("io: {0}")]
    Io(#[from] io::Error),
}
