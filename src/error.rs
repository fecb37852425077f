//! Error taxonomy shared by every fallible `World` operation.
//!
//! Every operation that returns `Error` is transactional: on failure, side
//! effects it performed earlier in the same call (entity table growth,
//! recycled-stack draw-down, partial matching-index inserts, ...) are
//! reversed before the error is returned.

/// Errors produced by the public `World` API.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum Error {
    /// A heap allocation failed (recycled-row stack growth, entity table
    /// growth, matching-index growth). `World` itself never aborts the
    /// process on this path; callers decide how to recover.
    #[error("allocation failed")]
    AllocFailed,

    /// A type or system identifier was registered twice.
    #[error("identifier already registered: {0}")]
    AlreadyExists(String),

    /// A type identifier used at parse time (not inside a requirement
    /// expression) was never registered, or a system identifier passed to
    /// `run` does not exist.
    #[error("identifier not found: {0}")]
    NotFound(String),

    /// A requirement or composition expression referenced an unknown
    /// component identifier, or a system's requirement count exceeds the
    /// number of registered types.
    #[error("bad requirement expression: {0}")]
    BadRequirement(String),

    /// An entity does not carry the requested component. Non-fatal: this
    /// variant exists for completeness (it documents the condition that
    /// `World::get_component` reports as `None` rather than `Err`) and is
    /// not returned by any public method today.
    #[error("entity has no such component: {0}")]
    NoComponent(String),
}

pub type Result<T> = std::result::Result<T, Error>;
