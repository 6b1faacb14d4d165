//! Process lifecycle
//!
//! The [`Coordinator`] watches two things at once: termination signals and
//! the server's done channel. The first signal shuts the manager down
//! (stopping refresh and flushing buffered usage) and then closes the
//! server; the coordinator keeps waiting until the server reports that it
//! has drained.

use std::fmt;
use std::io;
use std::sync::Arc;

use tokio::sync::mpsc;
use turnstile_authz::Manager;
use turnstile_core::LifecycleError;

use crate::server::{RpcServer, ServeResult};

/// Termination signal delivered to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Interrupt,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Terminate => write!(f, "SIGTERM"),
            Signal::Interrupt => write!(f, "SIGINT"),
        }
    }
}

/// Forward SIGTERM and SIGINT into a channel.
///
/// Handlers are installed before this returns, so a signal arriving right
/// after startup is not lost.
#[cfg(unix)]
pub fn listen_for_signals() -> io::Result<mpsc::Receiver<Signal>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = terminate.recv() => Signal::Terminate,
                Some(()) = interrupt.recv() => Signal::Interrupt,
                else => break,
            };
            if tx.send(received).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

#[cfg(not(unix))]
pub fn listen_for_signals() -> io::Result<mpsc::Receiver<Signal>> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(Signal::Interrupt).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

pub struct Coordinator {
    manager: Arc<Manager>,
    server: Arc<dyn RpcServer>,
}

impl Coordinator {
    pub fn new(manager: Arc<Manager>, server: Arc<dyn RpcServer>) -> Self {
        Self { manager, server }
    }

    /// Run until the server reports its terminal result.
    ///
    /// Returns `ShutdownFailed` when closing the server fails and
    /// `ServerTerminated` when the server stops with an error (or drops its
    /// done channel). The manager is always shut down before returning.
    pub async fn run(
        self,
        mut signals: mpsc::Receiver<Signal>,
        mut done: mpsc::Receiver<ServeResult>,
    ) -> Result<(), LifecycleError> {
        let mut signalled = false;
        let mut signals_open = true;

        loop {
            tokio::select! {
                received = signals.recv(), if signals_open => match received {
                    Some(signal) if signalled => {
                        tracing::info!(%signal, "Shutdown already in progress, ignoring signal");
                    }
                    Some(signal) => {
                        signalled = true;
                        tracing::info!(%signal, "Shutdown signal received");
                        self.manager.shutdown().await;
                        self.server.close().await.map_err(|e| {
                            tracing::error!(error = %e, "Failed to close adapter server");
                            LifecycleError::ShutdownFailed {
                                reason: e.to_string(),
                            }
                        })?;
                        tracing::info!("Waiting for adapter server to drain");
                    }
                    None => {
                        signals_open = false;
                        tracing::debug!("Signal listener closed");
                    }
                },
                result = done.recv() => return self.finish(result, signalled).await,
            }
        }
    }

    async fn finish(
        &self,
        result: Option<ServeResult>,
        signalled: bool,
    ) -> Result<(), LifecycleError> {
        if !signalled {
            self.manager.shutdown().await;
        }

        match result {
            Some(Ok(())) => {
                tracing::info!(signalled, "Adapter stopped");
                Ok(())
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, signalled, "Adapter server terminated unexpectedly");
                Err(LifecycleError::ServerTerminated {
                    reason: e.to_string(),
                })
            }
            None => Err(LifecycleError::ServerTerminated {
                reason: "server exited without reporting a result".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use turnstile_authz::Clients;
    use turnstile_core::{BackendConfig, CacheConfig};
    use turnstile_test_utils::{MockBackendApi, MockSystemApi, BACKEND_URL};

    #[derive(Default)]
    struct MockServer {
        closes: AtomicUsize,
        fail_close: AtomicBool,
        // Set when close is called, so tests can assert ordering against the manager
        manager_was_shut_down: Mutex<Option<bool>>,
        manager: Mutex<Option<Arc<Manager>>>,
    }

    impl MockServer {
        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RpcServer for MockServer {
        async fn run(&self, _done: mpsc::Sender<ServeResult>) -> io::Result<()> {
            Ok(())
        }

        async fn close(&self) -> io::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            let observed = self.manager.lock().as_ref().map(|m| m.is_shutting_down());
            *self.manager_was_shut_down.lock() = observed;
            if self.fail_close.load(Ordering::SeqCst) {
                return Err(io::Error::other("listener stuck"));
            }
            Ok(())
        }
    }

    struct Harness {
        manager: Arc<Manager>,
        server: Arc<MockServer>,
        signal_tx: mpsc::Sender<Signal>,
        done_tx: mpsc::Sender<ServeResult>,
        coordinator: tokio::task::JoinHandle<Result<(), LifecycleError>>,
    }

    fn start() -> Harness {
        let clients = Clients::new(
            Arc::new(MockSystemApi::new()),
            Arc::new(MockBackendApi::new()),
            BACKEND_URL,
        );
        let manager = Arc::new(
            Manager::new(clients, CacheConfig::default(), BackendConfig::direct()).unwrap(),
        );
        let server = Arc::new(MockServer::default());
        *server.manager.lock() = Some(manager.clone());

        let (signal_tx, signal_rx) = mpsc::channel(4);
        let (done_tx, done_rx) = mpsc::channel(1);
        let coordinator = tokio::spawn(
            Coordinator::new(manager.clone(), server.clone()).run(signal_rx, done_rx),
        );

        Harness {
            manager,
            server,
            signal_tx,
            done_tx,
            coordinator,
        }
    }

    async fn wait_for_close(server: &MockServer) {
        for _ in 0..200 {
            if server.closes() > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("server was never closed");
    }

    #[tokio::test]
    async fn test_signal_shuts_down_manager_then_closes_server() {
        let h = start();
        h.signal_tx.send(Signal::Terminate).await.unwrap();
        wait_for_close(&h.server).await;

        assert!(h.manager.is_shutting_down());
        assert_eq!(*h.server.manager_was_shut_down.lock(), Some(true));
        assert!(!h.coordinator.is_finished());

        h.done_tx.send(Ok(())).await.unwrap();
        assert!(h.coordinator.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_repeated_signals_close_once() {
        let h = start();
        h.signal_tx.send(Signal::Terminate).await.unwrap();
        h.signal_tx.send(Signal::Interrupt).await.unwrap();
        wait_for_close(&h.server).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        h.done_tx.send(Ok(())).await.unwrap();
        assert!(h.coordinator.await.unwrap().is_ok());
        assert_eq!(h.server.closes(), 1);
    }

    #[tokio::test]
    async fn test_close_failure_is_fatal() {
        let h = start();
        h.server.fail_close.store(true, Ordering::SeqCst);
        h.signal_tx.send(Signal::Interrupt).await.unwrap();

        let err = h.coordinator.await.unwrap().unwrap_err();
        assert!(matches!(err, LifecycleError::ShutdownFailed { .. }));
        assert!(err.to_string().contains("listener stuck"));
        assert_eq!(h.server.closes(), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_unexpected_termination() {
        let h = start();
        h.done_tx
            .send(Err(io::Error::other("accept failed")))
            .await
            .unwrap();

        let err = h.coordinator.await.unwrap().unwrap_err();
        assert!(matches!(err, LifecycleError::ServerTerminated { .. }));
        assert!(h.manager.is_shutting_down());
        assert_eq!(h.server.closes(), 0);
    }

    #[tokio::test]
    async fn test_clean_stop_without_signal_shuts_manager_down() {
        let h = start();
        h.done_tx.send(Ok(())).await.unwrap();

        assert!(h.coordinator.await.unwrap().is_ok());
        assert!(h.manager.is_shutting_down());
        assert_eq!(h.server.closes(), 0);
    }

    #[tokio::test]
    async fn test_dropped_done_channel_is_termination() {
        let h = start();
        drop(h.done_tx);

        let err = h.coordinator.await.unwrap().unwrap_err();
        assert!(matches!(err, LifecycleError::ServerTerminated { .. }));
    }

    #[tokio::test]
    async fn test_closed_signal_channel_keeps_waiting_for_server() {
        let h = start();
        drop(h.signal_tx);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!h.coordinator.is_finished());

        h.done_tx.send(Ok(())).await.unwrap();
        assert!(h.coordinator.await.unwrap().is_ok());
    }

    #[test]
    fn test_signal_display() {
        assert_eq!(Signal::Terminate.to_string(), "SIGTERM");
        assert_eq!(Signal::Interrupt.to_string(), "SIGINT");
    }
}
