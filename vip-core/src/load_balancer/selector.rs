//! Load Balancing Selector logic

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use tracing::warn;

use crate::domain::backend::BackendServer;
use crate::domain::routing::SharedBackendTable;

/// Live per-backend request counters, as read by least-connections.
pub trait RequestCounts {
    /// Requests attributed to `backend` so far (zero if unknown).
    fn request_count(&self, backend: Ipv4Addr) -> u64;
}

/// Backend selection policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Cycle through backends in table order.
    #[default]
    RoundRobin,
    /// Pick the backend with the fewest recorded requests.
    LeastConnections,
}

impl SelectionPolicy {
    /// Resolve a policy name. Unrecognized names fall back to round-robin.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "round_robin" => Self::RoundRobin,
            "least_connections" => Self::LeastConnections,
            other => {
                warn!(policy = other, "unknown selection policy, using round_robin");
                Self::RoundRobin
            }
        }
    }

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::LeastConnections => "least_connections",
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chooses the backend for each new flow.
///
/// Holds the round-robin cursor. One selector belongs to one engine and is
/// only ever driven from that engine's control path.
#[derive(Debug)]
pub struct ServerSelector {
    policy: SelectionPolicy,
    backends: SharedBackendTable,
    cursor: usize,
}

impl ServerSelector {
    /// Create a selector over a backend table.
    pub fn new(policy: SelectionPolicy, backends: SharedBackendTable) -> Self {
        Self {
            policy,
            backends,
            cursor: 0,
        }
    }

    /// The active policy.
    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Current round-robin position, always in `[0, N)`.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Select the backend for the next flow.
    ///
    /// Does not touch any counter; recording the decision is the caller's job.
    pub fn select(&mut self, counts: &impl RequestCounts) -> BackendServer {
        match self.policy {
            SelectionPolicy::RoundRobin => self.next_round_robin(),
            SelectionPolicy::LeastConnections => self.least_connections(counts),
        }
    }

    fn next_round_robin(&mut self) -> BackendServer {
        let backend = self.backends.as_slice()[self.cursor];
        self.cursor = (self.cursor + 1) % self.backends.len();
        backend
    }

    fn least_connections(&self, counts: &impl RequestCounts) -> BackendServer {
        // min_by_key keeps the first of equal minimums, i.e. table order.
        self.backends
            .iter()
            .min_by_key(|b| counts.request_count(b.address))
            .copied()
            .unwrap_or(self.backends.as_slice()[0])
    }
}
