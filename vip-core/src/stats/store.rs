//! The request statistics store and its derived metrics.

use parking_lot::{Mutex, MutexGuard};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::domain::routing::BackendTable;
use crate::load_balancer::selector::RequestCounts;
use crate::stats::window::BoundedWindow;

/// Default size of the per-backend response-time window and the recent log.
pub const DEFAULT_WINDOW_CAPACITY: usize = 50;

/// Largest accepted size for either window.
pub const MAX_WINDOW_CAPACITY: usize = 100_000;

/// Lower bound of synthesized response-time samples (milliseconds).
pub const SYNTHETIC_RESPONSE_MIN: f64 = 50.0;
/// Upper bound (exclusive) of synthesized response-time samples (milliseconds).
pub const SYNTHETIC_RESPONSE_MAX: f64 = 100.0;

/// Client label recorded when an update does not name one.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Stand-in for a measured response time.
///
/// The controller never observes real backend latency, so when a caller
/// supplies no sample a uniform value in `[50, 100)` is recorded instead.
pub fn synthesize_response_time() -> f64 {
    rand::thread_rng().gen_range(SYNTHETIC_RESPONSE_MIN..SYNTHETIC_RESPONSE_MAX)
}

/// Seconds since the Unix epoch as a float.
fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// One entry of the recent-request log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentRequest {
    /// Unix timestamp (seconds) the request was recorded at.
    pub timestamp: f64,
    /// Client address, or `"unknown"`.
    pub client: String,
    /// Backend the request was attributed to, as reported.
    pub server: Option<String>,
}

#[derive(Debug, Clone)]
struct BackendCounters {
    address: Ipv4Addr,
    request_count: u64,
    response_times: BoundedWindow<f64>,
}

/// Counters, rolling windows and start time of the current measurement period.
#[derive(Debug, Clone)]
pub struct StatsStore {
    total_requests: u64,
    per_backend: Vec<BackendCounters>,
    recent_requests: BoundedWindow<RecentRequest>,
    started: Instant,
}

impl StatsStore {
    /// Create a store for the given backends with the default window sizes.
    pub fn new(backends: &BackendTable) -> Self {
        Self::with_capacity(backends, DEFAULT_WINDOW_CAPACITY, DEFAULT_WINDOW_CAPACITY)
    }

    /// Create a store with explicit window sizes.
    pub fn with_capacity(
        backends: &BackendTable,
        response_window: usize,
        recent_window: usize,
    ) -> Self {
        Self::for_addresses(backends.iter().map(|b| b.address), response_window, recent_window)
    }

    /// Create a store keyed by bare addresses, in the given order.
    pub fn for_addresses<I>(addresses: I, response_window: usize, recent_window: usize) -> Self
    where
        I: IntoIterator<Item = Ipv4Addr>,
    {
        let per_backend = addresses
            .into_iter()
            .map(|address| BackendCounters {
                address,
                request_count: 0,
                response_times: BoundedWindow::new(response_window),
            })
            .collect();

        Self {
            total_requests: 0,
            per_backend,
            recent_requests: BoundedWindow::new(recent_window),
            started: Instant::now(),
        }
    }

    fn counters_mut(&mut self, address: Ipv4Addr) -> Option<&mut BackendCounters> {
        self.per_backend.iter_mut().find(|c| c.address == address)
    }

    /// Record a forwarding decision made by the engine.
    ///
    /// Increments the total and the backend's counter, appends a response
    /// sample (synthesized when `sample` is `None`) and logs the request.
    pub fn record_forward(
        &mut self,
        backend: Ipv4Addr,
        client: Ipv4Addr,
        sample: Option<f64>,
    ) -> RecentRequest {
        self.record(
            Some(backend.to_string()),
            Some(backend),
            client.to_string(),
            sample,
        )
    }

    /// Record an externally reported request (the `/update` path).
    ///
    /// Every update counts towards the total. Only a `server` naming a
    /// configured backend is attributed to that backend's counter and window.
    pub fn record_update(
        &mut self,
        server: Option<&str>,
        client: Option<&str>,
        sample: Option<f64>,
    ) -> RecentRequest {
        let known = server
            .and_then(|s| s.parse::<Ipv4Addr>().ok())
            .filter(|addr| self.per_backend.iter().any(|c| c.address == *addr));

        if server.is_some() && known.is_none() {
            debug!(server = ?server, "update for unknown backend counted but not attributed");
        }

        self.record(
            server.map(str::to_string),
            known,
            client.unwrap_or(UNKNOWN_CLIENT).to_string(),
            sample,
        )
    }

    fn record(
        &mut self,
        server_label: Option<String>,
        attribute_to: Option<Ipv4Addr>,
        client: String,
        sample: Option<f64>,
    ) -> RecentRequest {
        self.total_requests += 1;

        if let Some(counters) = attribute_to.and_then(|addr| self.counters_mut(addr)) {
            counters.request_count += 1;
            counters
                .response_times
                .push(sample.unwrap_or_else(synthesize_response_time));
        }

        let entry = RecentRequest {
            timestamp: unix_now(),
            client,
            server: server_label,
        };
        self.recent_requests.push(entry.clone());
        entry
    }

    /// Total requests since the last reset.
    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    /// Response samples retained for a backend, oldest first.
    pub fn response_times(&self, backend: Ipv4Addr) -> Vec<f64> {
        self.per_backend
            .iter()
            .find(|c| c.address == backend)
            .map(|c| c.response_times.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Compute the derived view without mutating anything.
    pub fn snapshot(&self) -> StatsView {
        let elapsed = self.started.elapsed().as_secs_f64();
        let rps = if elapsed > 0.0 {
            self.total_requests as f64 / elapsed
        } else {
            0.0
        };

        let mut servers = BTreeMap::new();
        let mut sample_sum = 0.0;
        let mut sample_count = 0usize;

        for counters in &self.per_backend {
            sample_sum += counters.response_times.iter().sum::<f64>();
            sample_count += counters.response_times.len();
            servers.insert(
                counters.address.to_string(),
                ServerView {
                    requests: counters.request_count,
                    avg_response: counters.response_times.mean(),
                },
            );
        }

        let avg_response = if sample_count == 0 {
            0.0
        } else {
            sample_sum / sample_count as f64
        };

        let counts: Vec<u64> = self.per_backend.iter().map(|c| c.request_count).collect();

        StatsView {
            total_requests: self.total_requests,
            rps,
            avg_response,
            balance_score: balance_score(self.total_requests, &counts),
            servers,
            recent_requests: self.recent_requests.iter_newest_first().cloned().collect(),
        }
    }

    /// Zero every counter, clear both windows and restart the clock.
    pub fn reset(&mut self) {
        self.total_requests = 0;
        for counters in &mut self.per_backend {
            counters.request_count = 0;
            counters.response_times.clear();
        }
        self.recent_requests.clear();
        self.started = Instant::now();
    }
}

impl RequestCounts for StatsStore {
    fn request_count(&self, backend: Ipv4Addr) -> u64 {
        self.per_backend
            .iter()
            .find(|c| c.address == backend)
            .map(|c| c.request_count)
            .unwrap_or(0)
    }
}

/// How evenly `counts` spread `total` requests, in `[0, 100]`.
///
/// Variance of the per-backend counts around the ideal even share, scaled by
/// that share. 100 means perfectly even (or no traffic yet).
pub fn balance_score(total: u64, counts: &[u64]) -> f64 {
    if total == 0 || counts.is_empty() {
        return 100.0;
    }

    let n = counts.len() as f64;
    let ideal = total as f64 / n;
    if ideal <= 0.0 {
        return 100.0;
    }

    let variance = counts
        .iter()
        .map(|&c| (c as f64 - ideal).powi(2))
        .sum::<f64>()
        / n;

    (100.0 - variance / ideal * 10.0).max(0.0)
}

/// Per-backend slice of [`StatsView`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerView {
    /// Requests attributed to the backend.
    pub requests: u64,
    /// Mean of its retained response samples.
    pub avg_response: f64,
}

/// Point-in-time statistics, shaped exactly as the `/stats` response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsView {
    /// Requests since the last reset.
    pub total_requests: u64,
    /// Requests per second since the last reset.
    pub rps: f64,
    /// Mean of every retained response sample.
    pub avg_response: f64,
    /// Distribution evenness in `[0, 100]`.
    pub balance_score: f64,
    /// Per-backend counters keyed by address.
    pub servers: BTreeMap<String, ServerView>,
    /// Recent requests, newest first.
    pub recent_requests: Vec<RecentRequest>,
}

impl StatsView {
    /// Share of all requests served by `server`, as a percentage.
    pub fn share_percent(&self, server: &str) -> f64 {
        match self.servers.get(server) {
            Some(view) if self.total_requests > 0 => {
                view.requests as f64 / self.total_requests as f64 * 100.0
            }
            _ => 0.0,
        }
    }
}

/// The one statistics store shared by the engine, reporter and stats API.
///
/// Every mutation and read goes through the same mutex, so a caller always
/// observes its own latest update.
#[derive(Debug, Clone)]
pub struct SharedStats {
    inner: Arc<Mutex<StatsStore>>,
}

impl SharedStats {
    /// Wrap a store for sharing.
    pub fn new(store: StatsStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Hold the lock across several operations (e.g. select then record).
    pub fn lock(&self) -> MutexGuard<'_, StatsStore> {
        self.inner.lock()
    }

    /// See [`StatsStore::record_forward`].
    pub fn record_forward(
        &self,
        backend: Ipv4Addr,
        client: Ipv4Addr,
        sample: Option<f64>,
    ) -> RecentRequest {
        self.inner.lock().record_forward(backend, client, sample)
    }

    /// See [`StatsStore::record_update`].
    pub fn record_update(
        &self,
        server: Option<&str>,
        client: Option<&str>,
        sample: Option<f64>,
    ) -> RecentRequest {
        self.inner.lock().record_update(server, client, sample)
    }

    /// See [`StatsStore::snapshot`].
    pub fn snapshot(&self) -> StatsView {
        self.inner.lock().snapshot()
    }

    /// See [`StatsStore::reset`].
    pub fn reset(&self) {
        self.inner.lock().reset();
    }
}
