//! Liveness endpoint.
//!
//! `GET /health` answers `200 OK` with body `OK`; every other path is a 404.
//! The server stops accepting when the shutdown token fires and gives open
//! connections a grace period to finish.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Path served by the endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Handle on a running health server.
#[derive(Debug)]
pub struct HealthServer {
    local_addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl HealthServer {
    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait until the server has stopped.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "health server task failed");
        }
    }
}

/// Bind `addr` and serve until `shutdown` is cancelled.
pub async fn spawn(
    addr: SocketAddr,
    grace: Duration,
    shutdown: CancellationToken,
) -> io::Result<HealthServer> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "health server listening");

    let handle = tokio::spawn(serve(listener, grace, shutdown));
    Ok(HealthServer { local_addr, handle })
}

async fn serve(listener: TcpListener, grace: Duration, shutdown: CancellationToken) {
    let graceful = GracefulShutdown::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "health accept failed");
                        continue;
                    }
                };
                let conn = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service_fn(handle_request));
                let conn = graceful.watch(conn);
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        tracing::debug!(%peer, error = %e, "health connection error");
                    }
                });
            }
        }
    }
    drop(listener);

    match tokio::time::timeout(grace, graceful.shutdown()).await {
        Ok(()) => tracing::info!("health server stopped"),
        Err(_) => tracing::warn!(?grace, "health server shutdown timed out"),
    }
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let (status, body) = if req.uri().path() == HEALTH_PATH {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::NOT_FOUND, "Not Found")
    };
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    Ok(response)
}
