use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors returned by [`Queue`](crate::Queue) operations.
///
/// A [`QueueError::Violation`] means the calling code broke the queue protocol
/// and should be treated as a bug. The remaining variants are outcomes a
/// caller can recover from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue contract violation: {0}")]
    Violation(#[from] Violation),

    #[error("wait on queue timed out")]
    TimedOut,

    #[error("wait on queue cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("a producer is already attached")]
    AlreadyAttached,

    #[error("no producer is attached")]
    NotAttached,

    #[error("buffers were already preallocated for this producer")]
    AlreadyPreallocated,

    #[error("preallocation requires at least one buffer")]
    EmptyPool,

    #[error("a push is already in flight")]
    PushInFlight,

    #[error("no push is in flight")]
    NoPushInFlight,

    #[error("a pull is already in flight")]
    PullInFlight,

    #[error("no pull is in flight")]
    NoPullInFlight,

    #[error("slot does not belong to this queue")]
    ForeignSlot,
}
