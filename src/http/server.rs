//! Transport server lifecycle
//!
//! Owns the listening socket. The accept loop runs on its own task and every
//! connection is served on a separate task, so slow handlers and long-lived
//! streaming connections never block accepting new ones.

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tracing::{info, warn};

use crate::errors::TransportError;
use crate::http::sse::NotificationHub;
use crate::{build_app, AppState};

pub struct TransportServer {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    notifications: Arc<NotificationHub>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
    shutdown_timeout: Duration,
}

impl TransportServer {
    pub async fn start(
        state: AppState,
        bind: SocketAddr,
        shutdown_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(bind).await?;
        let local_addr = listener.local_addr()?;
        let notifications = Arc::clone(&state.notifications);
        let app = build_app(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(addr = %local_addr, "transport server listening");

        Ok(Self {
            local_addr,
            running: Arc::new(AtomicBool::new(true)),
            notifications,
            shutdown: Some(shutdown_tx),
            task: Some(task),
            shutdown_timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Broadcasts a JSON payload to every open streaming connection.
    pub fn send_notification(&self, json: &str) -> usize {
        self.notifications.send_notification(json)
    }

    /// Stops accepting, disconnects streaming clients and waits a bounded
    /// time for in-flight requests to finish.
    pub async fn stop(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        self.notifications.close_all();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(err))) => warn!(error = %err, "transport server exited with error"),
                Ok(Err(err)) => warn!(error = %err, "transport server task failed"),
                Err(_) => {
                    warn!(
                        timeout_ms = self.shutdown_timeout.as_millis(),
                        "transport server did not stop in time, aborting"
                    );
                    task.abort();
                }
            }
        }

        info!(addr = %self.local_addr, "transport server stopped");
    }
}
