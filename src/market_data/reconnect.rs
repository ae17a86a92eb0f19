// =============================================================================
// Reconnect Controller — push-connection lifecycle with capped backoff
// =============================================================================
//
//   Disconnected --connect()--> Connecting
//   Connecting   --on_open----> Connected      (attempt = 0, backoff = initial)
//   Connecting | Connected --on_close(user)---> Disconnected  (terminal)
//   Connecting | Connected --on_close/error---> Reconnecting  (delay returned)
//   Reconnecting --retry timer--> Connecting
//
// Each scheduled retry uses the current backoff, then doubles it up to the
// cap and bumps `attempt`: 1000, 2000, 4000, 8000, 16000, 30000, 30000, ...
// With `max_attempts` set, running out of attempts lands in `Failed` until
// an explicit `connect()`.  After `dispose()` every notification is ignored.
// =============================================================================

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::types::{ConnectionState, ConnectionStatus};

/// Backoff tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// `None` retries indefinitely.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            max_attempts: None,
        }
    }
}

pub struct ReconnectController {
    policy: ReconnectPolicy,
    state: ConnectionState,
    disposed: bool,
}

impl ReconnectController {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::new(policy.initial_backoff_ms),
            policy,
            disposed: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[cfg(test)]
    pub fn status(&self) -> ConnectionStatus {
        self.state.status
    }

    /// Explicit connect request.  Honoured from `Disconnected` and `Failed`.
    pub fn connect(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        match self.state.status {
            ConnectionStatus::Disconnected | ConnectionStatus::Failed => {
                self.state = ConnectionState {
                    status: ConnectionStatus::Connecting,
                    attempt: 0,
                    next_backoff_ms: self.policy.initial_backoff_ms,
                };
                info!("feed connecting");
                true
            }
            other => {
                debug!(status = %other, "connect ignored");
                false
            }
        }
    }

    /// The transport reported an open connection.
    pub fn on_open(&mut self) -> bool {
        if self.disposed || self.state.status != ConnectionStatus::Connecting {
            return false;
        }
        self.state = ConnectionState {
            status: ConnectionStatus::Connected,
            attempt: 0,
            next_backoff_ms: self.policy.initial_backoff_ms,
        };
        info!("feed connected");
        true
    }

    /// The connection closed or errored.  Returns the delay after which the
    /// owner should fire [`Self::on_retry_timer`], or `None` when no retry is
    /// due (user close, exhausted attempts, disposed, or not connected).
    pub fn on_close(&mut self, user_initiated: bool) -> Option<Duration> {
        if self.disposed {
            return None;
        }
        match self.state.status {
            ConnectionStatus::Connecting | ConnectionStatus::Connected => {}
            ConnectionStatus::Reconnecting if user_initiated => {}
            other => {
                debug!(status = %other, "close ignored");
                return None;
            }
        }

        if user_initiated {
            self.state.status = ConnectionStatus::Disconnected;
            info!("feed disconnected by request");
            return None;
        }

        if let Some(max) = self.policy.max_attempts {
            if self.state.attempt >= max {
                self.state.status = ConnectionStatus::Failed;
                warn!(attempts = self.state.attempt, "feed reconnect attempts exhausted");
                return None;
            }
        }

        let delay_ms = self.state.next_backoff_ms;
        self.state = ConnectionState {
            status: ConnectionStatus::Reconnecting,
            attempt: self.state.attempt + 1,
            next_backoff_ms: delay_ms.saturating_mul(2).min(self.policy.max_backoff_ms),
        };
        warn!(
            attempt = self.state.attempt,
            delay_ms,
            "feed connection lost, reconnect scheduled"
        );
        Some(Duration::from_millis(delay_ms))
    }

    /// The backoff timer fired.
    pub fn on_retry_timer(&mut self) -> bool {
        if self.disposed || self.state.status != ConnectionStatus::Reconnecting {
            return false;
        }
        self.state.status = ConnectionStatus::Connecting;
        debug!(attempt = self.state.attempt, "feed reconnecting");
        true
    }

    /// Terminal: all later notifications are ignored.
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.state.status = ConnectionStatus::Disconnected;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> ReconnectController {
        ReconnectController::new(ReconnectPolicy::default())
    }

    #[test]
    fn backoff_sequence_doubles_and_caps() {
        let mut rc = controller();
        assert!(rc.connect());

        let mut delays = Vec::new();
        for _ in 0..8 {
            let delay = rc.on_close(false).expect("retry scheduled");
            delays.push(delay.as_millis() as u64);
            assert_eq!(rc.status(), ConnectionStatus::Reconnecting);
            assert!(rc.on_retry_timer());
            assert_eq!(rc.status(), ConnectionStatus::Connecting);
        }
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]
        );
        assert_eq!(rc.state().attempt, 8);
        assert!(rc.state().next_backoff_ms <= 30_000);
    }

    #[test]
    fn open_resets_backoff() {
        let mut rc = controller();
        rc.connect();
        rc.on_close(false);
        rc.on_retry_timer();
        rc.on_close(false);
        rc.on_retry_timer();
        assert!(rc.on_open());

        let state = rc.state();
        assert_eq!(state.status, ConnectionStatus::Connected);
        assert_eq!(state.attempt, 0);
        assert_eq!(state.next_backoff_ms, 1000);
        assert_eq!(rc.on_close(false), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn user_close_is_terminal() {
        let mut rc = controller();
        rc.connect();
        rc.on_open();
        assert_eq!(rc.on_close(true), None);
        assert_eq!(rc.status(), ConnectionStatus::Disconnected);
        // A late error after the user closed does not schedule anything.
        assert_eq!(rc.on_close(false), None);
        assert!(!rc.on_retry_timer());
    }

    #[test]
    fn user_close_while_reconnecting_stops_retries() {
        let mut rc = controller();
        rc.connect();
        rc.on_close(false);
        assert_eq!(rc.on_close(true), None);
        assert_eq!(rc.status(), ConnectionStatus::Disconnected);
        assert!(!rc.on_retry_timer());
    }

    #[test]
    fn connect_only_from_idle_states() {
        let mut rc = controller();
        assert!(rc.connect());
        assert!(!rc.connect());
        rc.on_open();
        assert!(!rc.connect());
    }

    #[test]
    fn attempt_cap_fails_then_connect_recovers() {
        let mut rc = ReconnectController::new(ReconnectPolicy {
            max_attempts: Some(2),
            ..ReconnectPolicy::default()
        });
        rc.connect();
        assert!(rc.on_close(false).is_some());
        rc.on_retry_timer();
        assert!(rc.on_close(false).is_some());
        rc.on_retry_timer();
        assert_eq!(rc.on_close(false), None);
        assert_eq!(rc.status(), ConnectionStatus::Failed);

        assert!(rc.connect());
        assert_eq!(rc.state().attempt, 0);
    }

    #[test]
    fn disposed_controller_ignores_everything() {
        let mut rc = controller();
        rc.connect();
        rc.dispose();
        assert!(!rc.on_open());
        assert_eq!(rc.on_close(false), None);
        assert!(!rc.on_retry_timer());
        assert!(!rc.connect());
        assert_eq!(rc.status(), ConnectionStatus::Disconnected);
    }
}
