use crate::core::{DaemonError, Result};
use crate::lifecycle::Transport;
use async_trait::async_trait;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

/// axum server running on its own task, stoppable through [`Transport`].
pub struct HttpTransport {
    local_addr: SocketAddr,
    stop_tx: watch::Sender<bool>,
    server: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
    abort_handle: AbortHandle,
    serving: Arc<AtomicBool>,
}

impl HttpTransport {
    pub async fn bind(addr: &str, router: Router) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DaemonError::Transport(format!("failed to bind to {addr}: {e}")))?;
        Self::serve(listener, router)
    }

    pub fn serve(listener: TcpListener, router: Router) -> Result<Arc<Self>> {
        let local_addr = listener.local_addr()?;
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let serving = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&serving);
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    while !*stop_rx.borrow_and_update() {
                        if stop_rx.changed().await.is_err() {
                            break;
                        }
                    }
                })
                .await;
            flag.store(false, Ordering::SeqCst);
            result
        });

        let abort_handle = server.abort_handle();
        info!(address = %local_addr, "http transport listening");

        Ok(Arc::new(Self {
            local_addr,
            stop_tx,
            server: Mutex::new(Some(server)),
            abort_handle,
            serving,
        }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn stop(&self) -> Result<()> {
        self.stop_tx.send_replace(true);
        debug!(address = %self.local_addr, "http transport stopping");

        let Some(server) = self.server.lock().await.take() else {
            return Ok(());
        };

        server
            .await
            .map_err(|e| DaemonError::Transport(format!("server task failed: {e}")))?
            .map_err(|e| DaemonError::Transport(format!("server error: {e}")))?;

        info!(address = %self.local_addr, "http transport stopped");
        Ok(())
    }

    fn is_serving(&self) -> bool {
        self.serving.load(Ordering::SeqCst) && !*self.stop_tx.borrow()
    }

    fn abort(&self) {
        self.stop_tx.send_replace(true);
        self.abort_handle.abort();
        self.serving.store(false, Ordering::SeqCst);
        warn!(address = %self.local_addr, "http transport aborted");
    }
}
