//! End-to-end tests of the stats API over real HTTP.

use std::net::{Ipv4Addr, SocketAddr};

use reqwest::StatusCode;
use tokio::net::TcpListener;
use vip_admin::{serve, StatusReply, UpdateRequest};
use vip_core::domain::{BackendTable, MacAddr};
use vip_core::stats::{SharedStats, StatsStore, StatsView};

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
    tokio::spawn(serve(listener, stats.clone(), std::future::pending()));

    (addr, stats)
}

#[tokio::test]
async fn stats_reflect_updates_in_order() {
    let (addr, _stats) = spawn_api().await;
    let client = reqwest::Client::new();

    for (server, client_ip) in [("10.0.0.1", "10.0.0.4"), ("10.0.0.2", "10.0.0.5"), ("10.0.0.3", "10.0.0.6")] {
        let reply: StatusReply = client
            .post(format!("http://{addr}/update"))
            .json(&UpdateRequest {
                server_ip: Some(server.to_string()),
                client_ip: Some(client_ip.to_string()),
                ..Default::default()
            })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reply.status, "ok");
    }

    let response = client.get(format!("http://{addr}/stats")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    let view: StatsView = response.json().await.unwrap();
    assert_eq!(view.total_requests, 3);
    assert_eq!(view.balance_score, 100.0);
    assert!(view.servers.values().all(|s| s.requests == 1));
    assert!(view.servers.values().all(|s| (50.0..100.0).contains(&s.avg_response)));
    let clients: Vec<&str> = view.recent_requests.iter().map(|r| r.client.as_str()).collect();
    assert_eq!(clients, vec!["10.0.0.6", "10.0.0.5", "10.0.0.4"]);
}

#[tokio::test]
async fn reset_clears_store() {
    let (addr, stats) = spawn_api().await;
    stats.record_update(Some("10.0.0.1"), Some("10.0.0.4"), None);

    let client = reqwest::Client::new();
    let reply: StatusReply = client
        .post(format!("http://{addr}/reset"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply.status, "reset");

    let view: StatsView = client
        .get(format!("http://{addr}/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view.total_requests, 0);
    assert_eq!(view.balance_score, 100.0);
    assert!(view.recent_requests.is_empty());
}

#[tokio::test]
async fn options_and_unknown_paths() {
    let (addr, _stats) = spawn_api().await;
    let client = reqwest::Client::new();

    let response = client
        .request(reqwest::Method::OPTIONS, format!("http://{addr}/update"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-methods"], "GET, POST, OPTIONS");
    assert!(response.bytes().await.unwrap().is_empty());

    let response = client.get(format!("http://{addr}/missing")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_update_is_rejected() {
    let (addr, stats) = spawn_api().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/update"))
        .body("{\"server_ip\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client.post(format!("http://{addr}/update")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(stats.snapshot().total_requests, 0);
}
