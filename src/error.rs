use thiserror::Error;

/// Error kinds surfaced by the core, per the error-handling design: the
/// core never retries and never logs a failure on a side channel, it always
/// returns through the top-level call.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid range [{from}, {to}): {reason}")]
    InvalidRange {
        from: u64,
        to: u64,
        reason: &'static str,
    },

    #[error("allocation failure while {context}")]
    AllocationFailure { context: &'static str },

    #[error("sink error: {0}")]
    SinkError(String),

    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(&'static str),
}

pub type CoreResult<T> = Result<T, CoreError>;
