//! HTTP server implementation.

use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{MarketgateError, Result};

/// HTTP server for the marketplace API front door.
pub struct HttpServer {
    /// Bound listener
    listener: TcpListener,
    /// Fully layered application router
    router: Router,
}

impl HttpServer {
    /// Bind the listener for `addr`.
    pub async fn bind(addr: SocketAddr, router: Router) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!(addr = %addr, error = %e, "Failed to bind HTTP listener");
            MarketgateError::Io(e)
        })?;
        Ok(Self { listener, router })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `signal` resolves, then drain in-flight requests.
    ///
    /// Peer addresses are exposed to handlers through `ConnectInfo`.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(addr = %self.local_addr()?, "Starting HTTP server with graceful shutdown");

        axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            MarketgateError::Io(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::http::{router, AppState};
    use crate::ratelimit::{AdmissionController, IdentityResolver, SystemClock};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn test_peer_address_is_rate_limit_identity() {
        let controller = Arc::new(AdmissionController::default());
        let state = Arc::new(AppState::new(
            Arc::clone(&controller),
            Arc::new(SystemClock),
            IdentityResolver::default(),
            "test",
        ));
        let app = router(state, &ServerConfig::default()).unwrap();

        let server = HttpServer::bind("127.0.0.1:0".parse().unwrap(), app)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_with_shutdown(async move {
            let _ = stop_rx.await;
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        assert!(raw.starts_with("HTTP/1.1 200"));
        assert!(raw.contains("x-ratelimit-remaining: 99"));
        assert_eq!(controller.window("127.0.0.1").unwrap().count, 1);

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
