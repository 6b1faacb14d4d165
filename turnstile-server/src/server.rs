//! Adapter server
//!
//! [`RpcServer`] is the seam between the lifecycle coordinator and whatever
//! transport the proxy speaks. [`HttpAdapterServer`] serves the axum router
//! built in [`crate::routes`].

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

/// Terminal result of a server, reported once on its done channel.
pub type ServeResult = io::Result<()>;

#[async_trait]
pub trait RpcServer: Send + Sync {
    /// Start serving in the background.
    ///
    /// Returns once the server accepts connections. Its terminal result is
    /// sent on `done` exactly once, whether it stopped after [`close`] or
    /// failed on its own.
    ///
    /// [`close`]: RpcServer::close
    async fn run(&self, done: mpsc::Sender<ServeResult>) -> io::Result<()>;

    /// Stop accepting connections and let in-flight requests finish.
    ///
    /// Returns as soon as the drain has started. Closing twice is an error.
    async fn close(&self) -> io::Result<()>;
}

pub struct HttpAdapterServer {
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    router: Router,
    shutdown_tx: watch::Sender<bool>,
    closed: AtomicBool,
}

impl HttpAdapterServer {
    /// Bind the listener without serving yet.
    pub async fn bind(addr: SocketAddr, router: Router) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            listener: Mutex::new(Some(listener)),
            local_addr,
            router,
            shutdown_tx,
            closed: AtomicBool::new(false),
        })
    }

    /// Address actually bound; differs from the requested one for port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcServer for HttpAdapterServer {
    async fn run(&self, done: mpsc::Sender<ServeResult>) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::other("server already closed"));
        }
        let listener = self
            .listener
            .lock()
            .take()
            .ok_or_else(|| io::Error::other("server already running"))?;

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let router = self.router.clone();
        let addr = self.local_addr;

        tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.wait_for(|stop| *stop).await;
                })
                .await;

            match &result {
                Ok(()) => tracing::info!(%addr, "Adapter server stopped"),
                Err(e) => tracing::error!(%addr, error = %e, "Adapter server failed"),
            }
            if done.send(result).await.is_err() {
                tracing::debug!("Server result dropped, nobody is waiting for it");
            }
        });

        tracing::info!(%addr, "Adapter server listening");
        Ok(())
    }

    async fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(io::Error::other("server already closed"));
        }
        tracing::info!(addr = %self.local_addr, "Adapter server draining");
        self.shutdown_tx.send_replace(true);
        Ok(())
    }
}

impl std::fmt::Debug for HttpAdapterServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAdapterServer")
            .field("local_addr", &self.local_addr)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use std::time::Duration;

    async fn bound() -> HttpAdapterServer {
        let router = Router::new().route("/ping", get(|| async { "pong" }));
        HttpAdapterServer::bind("127.0.0.1:0".parse().unwrap(), router)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_serves_until_closed() {
        let server = bound().await;
        let (done_tx, mut done_rx) = mpsc::channel(1);
        server.run(done_tx).await.unwrap();

        let body = reqwest::get(format!("http://{}/ping", server.local_addr()))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "pong");

        server.close().await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), done_rx.recv())
            .await
            .unwrap();
        assert!(matches!(result, Some(Ok(()))));
    }

    #[tokio::test]
    async fn test_second_close_is_an_error() {
        let server = bound().await;
        let (done_tx, _done_rx) = mpsc::channel(1);
        server.run(done_tx).await.unwrap();

        assert!(server.close().await.is_ok());
        assert!(server.close().await.is_err());
    }

    #[tokio::test]
    async fn test_cannot_run_twice_or_after_close() {
        let server = bound().await;
        let (done_tx, _done_rx) = mpsc::channel(1);
        server.run(done_tx.clone()).await.unwrap();
        assert!(server.run(done_tx).await.is_err());

        let closed = bound().await;
        closed.close().await.unwrap();
        let (done_tx, _done_rx) = mpsc::channel(1);
        assert!(closed.run(done_tx).await.is_err());
    }
}
