use crate::config::Config;
use crate::error::ProxyError;
use crate::events::EventSink;
use crate::handler::ConnectionHandler;
use crate::metrics::RelayMetrics;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

/// Accept loop with bounded admission.
///
/// A semaphore permit is taken before each accept and travels with the
/// spawned connection task, so at most `max_connections` exchanges run at
/// once; further clients wait in the listen backlog. Accept failures are
/// logged and the loop keeps serving.
#[derive(Debug)]
pub struct ProxyListener {
    listener: TcpListener,
    handler: Arc<ConnectionHandler>,
    metrics: Arc<RelayMetrics>,
    permits: Arc<Semaphore>,
}

impl ProxyListener {
    /// Binds the configured address. A bind failure is fatal; there is
    /// nothing to serve without the socket.
    pub async fn bind(
        config: &Config,
        metrics: Arc<RelayMetrics>,
        events: EventSink,
    ) -> Result<Self, ProxyError> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|e| ProxyError::Bind {
                addr: config.listen_addr.to_string(),
                source: e,
            })?;
        let handler = Arc::new(ConnectionHandler::new(config, Arc::clone(&metrics), events));
        Ok(Self {
            listener,
            handler,
            metrics,
            permits: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Address actually bound, for when the config asked for port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    async fn accept_one(&self) -> Result<(TcpStream, SocketAddr), ProxyError> {
        self.listener.accept().await.map_err(ProxyError::Accept)
    }

    /// Serves until the surrounding task is dropped.
    pub async fn run(self) -> Result<(), ProxyError> {
        if let Ok(addr) = self.local_addr() {
            log::info!("Relay listening on {}", addr);
        }

        loop {
            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                // Nobody closes the semaphore; treat it as a stop signal.
                Err(_) => return Ok(()),
            };

            match self.accept_one().await {
                Ok((stream, peer)) => {
                    let handler = Arc::clone(&self.handler);
                    let metrics = Arc::clone(&self.metrics);
                    tokio::spawn(async move {
                        let _permit = permit;
                        metrics.connection_opened();
                        log::debug!("Accepted connection from {}", peer);
                        match handler.handle(stream).await {
                            Ok(bytes) => {
                                log::debug!("Finished {} after relaying {} bytes", peer, bytes);
                            }
                            Err(e) => {
                                metrics.connection_failed();
                                log::debug!("Abandoned connection from {}: {}", peer, e);
                            }
                        }
                        metrics.connection_closed();
                    });
                }
                Err(e) => {
                    log::warn!("{}", e);
                }
            }
        }
    }
}
