//! Request-scoped caller context

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::models::UserId;

/// Who is calling and how long they are willing to wait
///
/// Built by the caller from an already verified identity. Cancelling the
/// token abandons the request; work that has not committed is rolled back.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub actor: UserId,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(actor: UserId) -> Self {
        Self {
            actor,
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Tie the request to an externally owned token (e.g. a server shutdown token)
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the request is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// `bound` shortened to whatever remains before the deadline
    pub fn budget(&self, bound: Duration) -> Duration {
        self.deadline.map_or(bound, |deadline| {
            bound.min(deadline.saturating_duration_since(Instant::now()))
        })
    }
}
