//! Crate-wide error taxonomy.
//!
//! Each variant corresponds to one row of the error-handling table: most
//! faults never reach here at all (an invalid breakpoint condition degrades
//! to "never matches", a divide-by-zero degrades to an [`EvalResult`] kind)
//! — this enum exists for the handful of operations that can genuinely fail
//! and must be surfaced to a caller (CDL load/save, breakpoint lookups by
//! id).
//!
//! [`EvalResult`]: crate::expr::EvalResult

use thiserror::Error;

use crate::cdl;
use crate::expr;

/// A convenient type alias for [`Result`](std::result::Result).
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error produced by the debugger core.
#[derive(Debug, Error)]
pub enum Error {
    /// Requested breakpoint could not be found.
    #[error("breakpoint {0} not found")]
    Breakpoint(u32),
    /// Expression compilation or evaluation failed in a way the caller
    /// needs to know about (at breakpoint-set time, not at access time).
    #[error(transparent)]
    Expr(#[from] expr::Error),
    /// CDL load/save failed.
    #[error(transparent)]
    Cdl(#[from] cdl::Error),
    /// A rewind request went outside the retained history window.
    #[error("step-back target outside rewind window")]
    RewindOutOfWindow,
    /// Attempted an unsupported operation.
    #[error("operation not supported")]
    Unsupported,
}
