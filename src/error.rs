//! This mod specifies `RedlockResult` as an alias for `Result` and the `RedlockError` enum
//! describing everything that can go wrong on the lock path.

use std::result;

/// Errors surfaced by the Instance Adapter and Quorum Coordinator.
#[derive(thiserror::Error, Debug)]
pub enum RedlockError {
    /// A scripted call failed for a reason other than a recoverable `NOSCRIPT`.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The coordinator was constructed with an empty (or entirely unreachable)
    /// instance list. Quorum is unsatisfiable in that configuration, so this
    /// is rejected at construction time rather than failing silently forever.
    #[error("not enough Redis instances to form a quorum")]
    NotEnoughInstances,

    /// Quorum was not reached, or validity dropped below zero, on every
    /// configured attempt.
    #[error("could not obtain lock on resource {0:?} after all retries")]
    CannotObtainLock(String),

    /// Raised only by the strict scoped form (`locked_or_fail`) when the
    /// underlying acquisition failed.
    #[error("lock unavailable for resource {0:?}")]
    LockUnavailable(String),
}

pub type RedlockResult<T> = result::Result<T, RedlockError>;
