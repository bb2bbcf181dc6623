use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// How often a cancellable wait wakes up to look at its token. The token has
/// no way to notify the queue's condition variable.
pub(crate) const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Bounds for a blocking queue call.
///
/// The default waits forever, which is what the plain `push_begin`,
/// `pull_begin` and `detach_producer` do.
#[derive(Clone, Debug, Default)]
pub struct Wait {
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl Wait {
    pub fn forever() -> Self {
        Self::default()
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::forever().with_timeout(timeout)
    }

    pub fn cancellable(cancel: CancellationToken) -> Self {
        Self {
            deadline: None,
            cancel: Some(cancel),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    pub(crate) fn is_cancellable(&self) -> bool {
        self.cancel.is_some()
    }
}
