//! Best-effort push of forwarding decisions to the dashboard stats API.
//!
//! The engine enqueues without waiting; a single worker POSTs each update
//! with a short timeout. Nothing here is retried and no failure ever reaches
//! the forwarding path.

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::http::uri::InvalidUri;
use hyper::{Request, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use vip_admin::api::UPDATE_PATH;
use vip_admin::UpdateRequest;
use vip_core::config::Config;

/// What happened to a notification handed to [`StatsNotifier::notify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Queued for delivery.
    Queued,
    /// The queue was full; the update was discarded.
    Dropped,
    /// The worker has stopped.
    Closed,
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The API acknowledged the update.
    Delivered,
    /// The API answered with a non-success status.
    Rejected(StatusCode),
    /// The request could not be built or sent.
    Failed(String),
    /// No answer within the timeout.
    TimedOut,
}

type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// Handle for queueing dashboard updates.
#[derive(Debug, Clone)]
pub struct StatsNotifier {
    tx: mpsc::Sender<UpdateRequest>,
}

impl StatsNotifier {
    /// Start the delivery worker for the API at `base_url`.
    pub fn spawn(
        base_url: &str,
        timeout: Duration,
        queue_depth: usize,
    ) -> Result<(Self, JoinHandle<()>), InvalidUri> {
        let uri: Uri = format!("{}{}", base_url.trim_end_matches('/'), UPDATE_PATH).parse()?;
        let client: HttpClient = Client::builder(TokioExecutor::new()).build_http();
        let (tx, mut rx) = mpsc::channel::<UpdateRequest>(queue_depth.max(1));

        let worker = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                match deliver(&client, &uri, &update, timeout).await {
                    Delivery::Delivered => trace!("dashboard update delivered"),
                    other => debug!(outcome = ?other, "dashboard update not delivered"),
                }
            }
        });

        Ok((Self { tx }, worker))
    }

    /// Start a worker for the configured notification target, if there is one.
    pub fn from_config(config: &Config) -> Result<Option<(Self, JoinHandle<()>)>, InvalidUri> {
        match config.notification_url() {
            Some(url) => {
                Self::spawn(url, config.dashboard.timeout(), config.dashboard.queue_depth).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Queue an update without waiting.
    pub fn notify(&self, update: UpdateRequest) -> NotifyOutcome {
        match self.tx.try_send(update) {
            Ok(()) => NotifyOutcome::Queued,
            Err(TrySendError::Full(_)) => NotifyOutcome::Dropped,
            Err(TrySendError::Closed(_)) => NotifyOutcome::Closed,
        }
    }
}

/// POST one update, bounded by `timeout`.
pub async fn deliver(
    client: &HttpClient,
    uri: &Uri,
    update: &UpdateRequest,
    timeout: Duration,
) -> Delivery {
    let body = match serde_json::to_vec(update) {
        Ok(body) => body,
        Err(err) => return Delivery::Failed(err.to_string()),
    };

    let request = match Request::post(uri.clone())
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
    {
        Ok(request) => request,
        Err(err) => return Delivery::Failed(err.to_string()),
    };

    let exchange = async {
        let response = client
            .request(request)
            .await
            .map_err(|err| err.to_string())?;
        let status = response.status();
        let _ = response.into_body().collect().await;
        Ok::<_, String>(status)
    };

    match tokio::time::timeout(timeout, exchange).await {
        Err(_) => Delivery::TimedOut,
        Ok(Err(err)) => Delivery::Failed(err),
        Ok(Ok(status)) if status.is_success() => Delivery::Delivered,
        Ok(Ok(status)) => Delivery::Rejected(status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr};
    use tokio::net::TcpListener;
    use vip_core::domain::{BackendTable, MacAddr};
    use vip_core::stats::{SharedStats, StatsStore};

    fn update(server: &str) -> UpdateRequest {
        UpdateRequest {
            server_ip: Some(server.to_string()),
            client_ip: Some("10.0.0.4".to_string()),
            ..Default::default()
        }
    }

    async fn spawn_api() -> (SocketAddr, SharedStats) {
        let table = BackendTable::new((1..=3).map(|i| {
            (
                Ipv4Addr::new(10, 0, 0, i),
                MacAddr::new(0, 0, 0, 0, 0, i),
                u16::from(i),
            )
        }))
        .unwrap();
        let stats = SharedStats::new(StatsStore::new(&table));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(vip_admin::serve(listener, stats.clone(), std::future::pending()));
        (addr, stats)
    }

    async fn closed_port() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    #[tokio::test]
    async fn test_update_reaches_stats_api() {
        let (addr, stats) = spawn_api().await;
        let (notifier, worker) =
            StatsNotifier::spawn(&format!("http://{addr}/"), Duration::from_secs(1), 8).unwrap();

        assert_eq!(notifier.notify(update("10.0.0.3")), NotifyOutcome::Queued);

        for _ in 0..100 {
            if stats.snapshot().total_requests == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let view = stats.snapshot();
        assert_eq!(view.total_requests, 1);
        assert_eq!(view.servers["10.0.0.3"].requests, 1);
        worker.abort();
    }

    #[tokio::test]
    async fn test_deliver_reports_failure_for_unreachable_api() {
        let addr = closed_port().await;
        let client: HttpClient = Client::builder(TokioExecutor::new()).build_http();
        let uri: Uri = format!("http://{addr}/update").parse().unwrap();

        let outcome = deliver(&client, &uri, &update("10.0.0.1"), Duration::from_secs(1)).await;
        assert!(matches!(outcome, Delivery::Failed(_) | Delivery::TimedOut));
    }

    #[tokio::test]
    async fn test_deliver_reports_rejection() {
        let (addr, _stats) = spawn_api().await;
        let client: HttpClient = Client::builder(TokioExecutor::new()).build_http();
        let uri: Uri = format!("http://{addr}/nowhere").parse().unwrap();

        let outcome = deliver(&client, &uri, &update("10.0.0.1"), Duration::from_secs(1)).await;
        assert_eq!(outcome, Delivery::Rejected(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let (tx, _rx) = mpsc::channel(1);
        let notifier = StatsNotifier { tx };
        assert_eq!(notifier.notify(update("10.0.0.1")), NotifyOutcome::Queued);
        assert_eq!(notifier.notify(update("10.0.0.2")), NotifyOutcome::Dropped);
    }

    #[tokio::test]
    async fn test_stopped_worker_reports_closed() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let notifier = StatsNotifier { tx };
        assert_eq!(notifier.notify(update("10.0.0.1")), NotifyOutcome::Closed);
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(StatsNotifier::spawn("http://bad host", Duration::from_secs(1), 1).is_err());
    }
}
