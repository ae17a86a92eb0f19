// =============================================================================
// Timer — cancellable one-shot deadline for the session event loop
// =============================================================================
//
// The flush window and the reconnect backoff are both one-shot deadlines
// owned by the session task.  A `Timer` is polled inside `tokio::select!`;
// an idle or cancelled timer never fires.  Built on `tokio::time`, so tests
// drive it with a paused clock instead of waiting on wall time.
// =============================================================================

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    pub fn idle() -> Self {
        Self { deadline: None }
    }

    /// Arm (or re-arm) the timer `delay` from now.
    pub fn schedule(&mut self, delay: Duration) {
        self.deadline = Some(Instant::now() + delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves once the deadline passes, disarming the timer.  Pending
    /// forever while idle.  Cancellation-safe: dropping the future before it
    /// resolves leaves the deadline armed.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(at) => {
                tokio::time::sleep_until(at).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
