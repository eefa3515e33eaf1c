use crate::config::Config;
use crate::error::ProxyError;
use crate::events::EventSink;
use crate::metrics::RelayMetrics;
use crate::relay::UpstreamRelay;
use crate::request::read_request;
use crate::target::{Destination, origin_form};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Runs one request/response exchange per client connection.
///
/// The pipeline is parse, resolve, rewrite, forward; the first failure
/// abandons the connection with nothing written back to the client. Both
/// ends close when their halves drop, on success and failure alike, so no
/// exit path can leak a socket.
#[derive(Debug)]
pub struct ConnectionHandler {
    relay: UpstreamRelay,
    events: EventSink,
}

impl ConnectionHandler {
    pub fn new(config: &Config, metrics: Arc<RelayMetrics>, events: EventSink) -> Self {
        let relay = UpstreamRelay::new(
            config.chunk_size,
            config.connect_timeout_secs.map(Duration::from_secs),
            metrics,
            events.clone(),
        );
        Self { relay, events }
    }

    /// Serves the connection to completion and reports the bytes relayed.
    pub async fn handle<S>(&self, stream: S) -> Result<u64, ProxyError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        let request = read_request(&mut reader, &self.events).await?;
        let dest = Destination::from_host_header(request.host.as_deref())?;
        let line = origin_form(&request.method, &request.target, &request.version)?;
        log::debug!("Forwarding \"{}\" to {}", line, dest);

        let relayed = self
            .relay
            .forward(&dest, &line, &request.headers, &mut write_half)
            .await?;
        write_half.shutdown().await?;
        Ok(relayed)
    }
}
