//! Error taxonomy for the agent messaging layer.
//!
//! Three failure classes reach callers:
//! - [`AxError::TimedOut`] — no responder answered within the deadline.
//!   A name that is registered nowhere on the partition is indistinguishable
//!   from channel silence, so "not found" surfaces as a timeout as well.
//! - [`AxError::RemoteExecution`] — a responder existed but its binding
//!   failed (returned an error or panicked). The responder's id and the
//!   failure message are carried back to exactly the awaiting caller.
//! - [`AxError::InvalidName`] — a local misuse: the name cannot participate
//!   in the addressing grammar and was rejected at registration time.

use thiserror::Error;

/// Errors surfaced by agent calls and registrations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AxError {
    /// No response arrived within the configured deadline.
    #[error("timed out waiting for a response")]
    TimedOut,

    /// A responder ran the binding and it failed.
    #[error("remote execution failed on `{responder}`: {message}")]
    RemoteExecution {
        /// Id of the agent that executed the binding.
        responder: String,
        /// Failure message reported by the binding (or its panic payload).
        message: String,
    },

    /// The name cannot be registered: it is empty, contains the qualified
    /// address separator `.`, or carries the publish suffix `!`.
    #[error("`{0}` is not a registrable name")]
    InvalidName(String),
}

impl AxError {
    /// True if this error is the timeout sentinel.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AxError::TimedOut)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
