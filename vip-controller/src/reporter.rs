//! Background task logging a periodic distribution summary.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::info;
use vip_core::stats::{SharedStats, StatsView};

/// Human-readable summary lines for a snapshot.
pub fn summary_lines(view: &StatsView) -> Vec<String> {
    let mut lines = Vec::with_capacity(view.servers.len() + 2);
    lines.push("Load Balancer Statistics".to_string());
    lines.push(format!(
        "Total requests: {}, RPS: {:.2}",
        view.total_requests, view.rps
    ));
    for (server, data) in &view.servers {
        lines.push(format!(
            "  Server {}: {} requests ({:.1}%)",
            server,
            data.requests,
            view.share_percent(server)
        ));
    }
    lines
}

/// Spawns a background Tokio task that logs a summary every `every`.
///
/// The task only reads snapshots through the shared lock. Abort the returned
/// handle to stop it.
pub fn spawn_stats_reporter(stats: SharedStats, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(every);

        // Prevent immediately ticking when spawned
        interval.tick().await;

        loop {
            interval.tick().await;

            let view = stats.snapshot();
            info!("{}", "=".repeat(60));
            for line in summary_lines(&view) {
                info!("{}", line);
            }
            info!("{}", "=".repeat(60));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use vip_core::domain::{BackendTable, MacAddr};
    use vip_core::stats::StatsStore;

    fn stats() -> SharedStats {
        let table = BackendTable::new((1..=3).map(|i| {
            (
                Ipv4Addr::new(10, 0, 0, i),
                MacAddr::new(0, 0, 0, 0, 0, i),
                u16::from(i),
            )
        }))
        .unwrap();
        SharedStats::new(StatsStore::new(&table))
    }

    #[test]
    fn test_summary_lines() {
        let stats = stats();
        for last in [1, 1, 2, 3] {
            stats.record_forward(Ipv4Addr::new(10, 0, 0, last), Ipv4Addr::new(10, 0, 0, 4), None);
        }
        let lines = summary_lines(&stats.snapshot());
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("Total requests: 4, RPS: "));
        assert_eq!(lines[2], "  Server 10.0.0.1: 2 requests (50.0%)");
        assert_eq!(lines[4], "  Server 10.0.0.3: 1 requests (25.0%)");
    }

    #[test]
    fn test_summary_without_traffic() {
        let lines = summary_lines(&stats().snapshot());
        assert_eq!(lines[2], "  Server 10.0.0.1: 0 requests (0.0%)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_never_mutates() {
        let stats = stats();
        stats.record_forward(Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 4), Some(70.0));
        let before = stats.snapshot();

        let handle = spawn_stats_reporter(stats.clone(), Duration::from_secs(5));
        time::sleep(Duration::from_secs(16)).await;
        handle.abort();

        let after = stats.snapshot();
        assert_eq!(after.total_requests, before.total_requests);
        assert_eq!(after.servers, before.servers);
        assert_eq!(after.recent_requests, before.recent_requests);
    }
}
