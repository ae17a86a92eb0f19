// =============================================================================
// Shared types used across the chart feed
// =============================================================================

use serde::{Deserialize, Serialize};

/// Lifecycle of the live push connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Connection status plus the retry bookkeeping the consumer displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub attempt: u32,
    pub next_backoff_ms: u64,
}

impl ConnectionState {
    pub fn new(initial_backoff_ms: u64) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            attempt: 0,
            next_backoff_ms: initial_backoff_ms,
        }
    }
}

/// Where the seeded history came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum HistoryOrigin {
    /// Seeded from the upstream history endpoint.
    Upstream,
    /// Degraded mode: upstream unusable, seeded with a generated series.
    Synthetic { reason: String },
}

impl HistoryOrigin {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Synthetic { .. })
    }
}

impl std::fmt::Display for HistoryOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upstream => write!(f, "Upstream"),
            Self::Synthetic { reason } => write!(f, "Synthetic ({reason})"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_defaults_to_disconnected() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
        assert_eq!(ConnectionState::new(1_000).status, ConnectionStatus::default());
    }

    #[test]
    fn history_origin_is_tagged() {
        let json = serde_json::to_value(HistoryOrigin::Synthetic { reason: "timeout".into() }).unwrap();
        assert_eq!(json["origin"], "synthetic");
        assert_eq!(json["reason"], "timeout");
        assert!(!HistoryOrigin::Upstream.is_degraded());
    }
}
