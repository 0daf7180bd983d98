//! Liveness endpoint
//!
//! `GET /healthz` answers `200 ok` for as long as the process is serving.
//! Load balancers and Kubernetes probes point here.

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

pub const HEALTH_PATH: &str = "/healthz";

async fn healthz_handler() -> &'static str {
    "ok"
}

/// Router with the health route
pub fn create_health_router() -> Router {
    Router::new()
        .route(HEALTH_PATH, get(healthz_handler))
        .layer(TraceLayer::new_for_http())
}

/// HTTP listener for the health route with graceful stop
pub struct HealthServer {
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    stopped_tx: watch::Sender<bool>,
}

impl HealthServer {
    pub async fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Health check server listening on {}", local_addr);

        Ok(HealthServer {
            listener: Mutex::new(Some(listener)),
            local_addr,
            shutdown_tx: watch::channel(false).0,
            stopped_tx: watch::channel(false).0,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn take_listener(&self) -> Option<TcpListener> {
        self.listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Serve until [`HealthServer::shutdown`] is called
    pub async fn serve(&self) -> std::io::Result<()> {
        let Some(listener) = self.take_listener() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                "health listener is already serving or was stopped",
            ));
        };

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let result = axum::serve(listener, create_health_router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.wait_for(|stopped| *stopped).await;
            })
            .await;

        self.stopped_tx.send_replace(true);
        result
    }

    /// Stop accepting connections and wait for open ones to finish
    pub async fn shutdown(&self) -> std::io::Result<()> {
        self.shutdown_tx.send_replace(true);

        // Never served: dropping the listener is enough
        if self.take_listener().is_some() {
            return Ok(());
        }

        let mut stopped_rx = self.stopped_tx.subscribe();
        let _ = stopped_rx.wait_for(|stopped| *stopped).await;
        info!("Health check server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_healthz_ok() {
        let response = create_health_router()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_unknown_path_not_found() {
        let response = create_health_router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serves_over_tcp_until_shutdown() {
        let server = Arc::new(HealthServer::bind("127.0.0.1:0".parse().unwrap()).await.unwrap());
        let addr = server.local_addr();
        let serving = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.serve().await }
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        assert!(raw.starts_with("HTTP/1.1 200"));
        assert!(raw.ends_with("ok"));

        tokio::time::timeout(Duration::from_secs(5), server.shutdown())
            .await
            .unwrap()
            .unwrap();
        serving.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_without_serving() {
        let server = HealthServer::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        server.shutdown().await.unwrap();
        assert!(server.serve().await.is_err());
    }
}
