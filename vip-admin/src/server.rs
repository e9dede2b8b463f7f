//! Server module for accepting dashboard connections.

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use vip_core::stats::SharedStats;

use crate::api::handle_request;
use crate::error::{ApiError, ApiResult};

/// Bind `addr` and serve the stats API until `shutdown` resolves.
pub async fn start_server<F>(addr: SocketAddr, stats: SharedStats, shutdown: F) -> ApiResult<()>
where
    F: Future<Output = ()>,
{
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ApiError::Bind { addr, source })?;

    serve(listener, stats, shutdown).await
}

/// Serve the stats API on an already bound listener until `shutdown` resolves.
///
/// Each connection runs on its own task; every one of them reads and writes
/// the same [`SharedStats`].
pub async fn serve<F>(listener: TcpListener, stats: SharedStats, shutdown: F) -> ApiResult<()>
where
    F: Future<Output = ()>,
{
    info!("Stats API listening on http://{}", listener.local_addr()?);

    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            _ = &mut shutdown => {
                info!("Stats API shutting down");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(err) => {
                    warn!("Failed to accept stats API connection: {}", err);
                    continue;
                }
            },
        };

        let stats = stats.clone();
        tokio::task::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| handle_request(req, stats.clone()));

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Error serving stats connection from {}: {:?}", peer, err);
            }
        });
    }
}
