//! Construction-time failures, distinct from the wire-visible error string
//! that flows through `PromiseResult`/`Promise` (see `SPEC_FULL.md` §3.1).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("format '{0}' is already registered")]
    DuplicateFormat(String),

    #[error("no such format {0}")]
    UnknownFormat(String),

    #[error("failed to load module at {path}: {reason}")]
    ModuleLoad { path: String, reason: String },
}
