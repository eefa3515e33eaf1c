use crate::error::ProxyError;
use crate::events::{EventSink, ProxyEvent};
use crate::metrics::RelayMetrics;
use crate::target::Destination;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Dials the upstream, replays the request head and streams the response
/// back to the client.
///
/// Every request gets a fresh upstream connection; the response is copied
/// opaquely in `chunk_size` reads until the upstream closes. The relay
/// never inspects response bytes, so status lines, headers and bodies all
/// travel the same path.
#[derive(Debug)]
pub struct UpstreamRelay {
    chunk_size: usize,
    connect_timeout: Option<Duration>,
    metrics: Arc<RelayMetrics>,
    events: EventSink,
}

impl UpstreamRelay {
    pub fn new(
        chunk_size: usize,
        connect_timeout: Option<Duration>,
        metrics: Arc<RelayMetrics>,
        events: EventSink,
    ) -> Self {
        Self {
            chunk_size,
            connect_timeout,
            metrics,
            events,
        }
    }

    async fn connect(&self, dest: &Destination) -> Result<TcpStream, ProxyError> {
        let unreachable = |reason: String| ProxyError::UpstreamUnreachable {
            host: dest.host.clone(),
            port: dest.port,
            reason,
        };

        let dial = TcpStream::connect((dest.host.as_str(), dest.port));
        match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, dial)
                .await
                .map_err(|_| unreachable(format!("connect timed out after {:?}", limit)))?
                .map_err(|e| unreachable(e.to_string())),
            None => dial.await.map_err(|e| unreachable(e.to_string())),
        }
    }

    /// Forwards one exchange and returns the bytes relayed for it.
    ///
    /// The transfer counter is bumped once per chunk, after the chunk has
    /// been written to the client; a failed exchange leaves the counter at
    /// whatever it had already earned.
    pub async fn forward<W>(
        &self,
        dest: &Destination,
        request_line: &str,
        headers: &[String],
        client: &mut W,
    ) -> Result<u64, ProxyError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut upstream = self.connect(dest).await?;
        log::debug!("Connected upstream to {}", dest);

        let mut head = String::with_capacity(request_line.len() + 64);
        head.push_str(request_line);
        head.push_str("\r\n");
        for header in headers {
            head.push_str(header);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        upstream.write_all(head.as_bytes()).await?;
        upstream.flush().await?;

        let mut buf = vec![0u8; self.chunk_size];
        let mut relayed = 0u64;
        loop {
            let n = upstream.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            client.write_all(&buf[..n]).await?;
            relayed += n as u64;
            let total = self.metrics.add_transferred(n as u64);
            if self.events.is_enabled() {
                self.events
                    .emit(ProxyEvent::ResponseChunk(Bytes::copy_from_slice(&buf[..n])));
                self.events.emit(ProxyEvent::BytesTransferred(total));
            }
        }
        client.flush().await?;

        Ok(relayed)
    }
}
