//! Request routing for the dashboard stats API.
//!
//! | method    | path      | effect                                   |
//! |-----------|-----------|------------------------------------------|
//! | `GET`     | `/stats`  | current [`StatsView`](vip_core::stats::StatsView) |
//! | `POST`    | `/update` | record one request, `{"status":"ok"}`    |
//! | `POST`    | `/reset`  | clear everything, `{"status":"reset"}`   |
//! | `OPTIONS` | any       | CORS preflight, empty body               |

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::{debug, trace, warn};
use vip_core::stats::SharedStats;

use crate::error::{ApiError, ApiResult};

/// Path of the read endpoint.
pub const STATS_PATH: &str = "/stats";
/// Path of the write endpoint.
pub const UPDATE_PATH: &str = "/update";
/// Path of the reset endpoint.
pub const RESET_PATH: &str = "/reset";

/// Body of `POST /update`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// Backend that served the request.
    #[serde(default)]
    pub server_ip: Option<String>,
    /// Measured response time; synthesized when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
    /// Requesting client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    /// Sender-side timestamp. Accepted and ignored; the store stamps entries itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

/// Body of the `/update` and `/reset` acknowledgements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    /// `"ok"` or `"reset"`.
    pub status: String,
}

impl StatusReply {
    fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

fn with_cors(mut response: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            with_cors(response)
        }
        Err(err) => {
            warn!("failed to encode response: {}", err);
            with_cors(empty(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

fn error_response(err: &ApiError) -> Response<Full<Bytes>> {
    json(err.status_code(), &serde_json::json!({ "error": err.to_string() }))
}

fn preflight() -> Response<Full<Bytes>> {
    let mut response = with_cors(empty(StatusCode::OK));
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

/// Parse an `/update` body.
pub fn parse_update(body: &[u8]) -> ApiResult<UpdateRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::MissingBody);
    }
    Ok(serde_json::from_slice(body)?)
}

/// Route one fully-read request against the shared store.
pub fn dispatch(method: &Method, path: &str, body: &[u8], stats: &SharedStats) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::OPTIONS, _) => preflight(),
        (&Method::GET, STATS_PATH) => json(StatusCode::OK, &stats.snapshot()),
        (&Method::POST, UPDATE_PATH) => match parse_update(body) {
            Ok(update) => {
                let entry = stats.record_update(
                    update.server_ip.as_deref(),
                    update.client_ip.as_deref(),
                    update.response_time,
                );
                trace!(client = %entry.client, server = ?entry.server, "update recorded");
                json(StatusCode::OK, &StatusReply::new("ok"))
            }
            Err(err) => {
                debug!("rejected update: {}", err);
                error_response(&err)
            }
        },
        (&Method::POST, RESET_PATH) => {
            stats.reset();
            debug!("statistics reset");
            json(StatusCode::OK, &StatusReply::new("reset"))
        }
        (&Method::GET, _) | (&Method::POST, _) => with_cors(empty(StatusCode::NOT_FOUND)),
        _ => with_cors(empty(StatusCode::METHOD_NOT_ALLOWED)),
    }
}

/// Read the request body and dispatch it.
pub async fn handle_request(
    req: Request<hyper::body::Incoming>,
    stats: SharedStats,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => return Ok(error_response(&ApiError::BodyRead(err))),
    };

    Ok(dispatch(&parts.method, parts.uri.path(), &body, &stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use vip_core::domain::{BackendTable, MacAddr};
    use vip_core::stats::{StatsStore, StatsView};

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

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_get_stats_empty() {
        let response = dispatch(&Method::GET, STATS_PATH, b"", &stats());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let view: StatsView = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(view.total_requests, 0);
        assert_eq!(view.balance_score, 100.0);
    }

    #[tokio::test]
    async fn test_update_then_stats() {
        let stats = stats();
        let response = dispatch(
            &Method::POST,
            UPDATE_PATH,
            br#"{"server_ip":"10.0.0.2","client_ip":"10.0.0.4","response_time":64,"timestamp":1.5}"#,
            &stats,
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({"status": "ok"}));

        let view = stats.snapshot();
        assert_eq!(view.total_requests, 1);
        assert_eq!(view.servers["10.0.0.2"].requests, 1);
        assert_eq!(view.servers["10.0.0.2"].avg_response, 64.0);
        assert_eq!(view.recent_requests[0].client, "10.0.0.4");
    }

    #[tokio::test]
    async fn test_update_unknown_server_counts_total_only() {
        let stats = stats();
        let response = dispatch(&Method::POST, UPDATE_PATH, br#"{"server_ip":"10.0.0.9"}"#, &stats);
        assert_eq!(response.status(), StatusCode::OK);

        let view = stats.snapshot();
        assert_eq!(view.total_requests, 1);
        assert!(view.servers.values().all(|s| s.requests == 0));
    }

    #[tokio::test]
    async fn test_update_rejects_missing_or_bad_body() {
        let stats = stats();
        let response = dispatch(&Method::POST, UPDATE_PATH, b"", &stats);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());

        let response = dispatch(&Method::POST, UPDATE_PATH, b"not json", &stats);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(stats.snapshot().total_requests, 0);
    }

    #[tokio::test]
    async fn test_reset() {
        let stats = stats();
        stats.record_update(Some("10.0.0.1"), None, None);
        let response = dispatch(&Method::POST, RESET_PATH, b"", &stats);
        assert_eq!(body_json(response).await, serde_json::json!({"status": "reset"}));

        let view = stats.snapshot();
        assert_eq!(view.total_requests, 0);
        assert!(view.recent_requests.is_empty());
    }

    #[test]
    fn test_preflight() {
        let response = dispatch(&Method::OPTIONS, "/anything", b"", &stats());
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, POST, OPTIONS");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
    }

    #[test]
    fn test_unknown_routes() {
        let stats = stats();
        assert_eq!(dispatch(&Method::GET, "/nope", b"", &stats).status(), StatusCode::NOT_FOUND);
        assert_eq!(dispatch(&Method::POST, STATS_PATH, b"", &stats).status(), StatusCode::NOT_FOUND);
        assert_eq!(dispatch(&Method::GET, RESET_PATH, b"", &stats).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            dispatch(&Method::DELETE, STATS_PATH, b"", &stats).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(stats.snapshot().total_requests, 0);
    }

    #[test]
    fn test_update_request_defaults() {
        let update = parse_update(b"{}").unwrap();
        assert_eq!(update, UpdateRequest::default());
    }
}
