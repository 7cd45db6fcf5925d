//! Built-in middleware.
//!
//! Each stage is an ordinary [`Handler`](crate::Handler) and can be placed
//! anywhere in a pipeline. Position matters:
//!
//! - [`Recovery`] only contains panics raised *downstream* of it, so it
//!   belongs at the front.
//! - [`Logger`] reports the status observed after the rest of the chain
//!   has run, so place it before the stages whose outcome it should see.
//! - [`Static`] answers `GET`/`HEAD` for files it finds and passes
//!   everything else on.

mod logger;
mod recovery;
mod static_files;

pub use logger::Logger;
pub use recovery::{Recovery, RecoveryConfig};
pub use static_files::Static;
