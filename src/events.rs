use bytes::Bytes;
use tokio::sync::mpsc;

/// Observation events published by the relay core.
///
/// Events are notifications only: the relay's behavior never depends on
/// whether anyone receives them, and a slow or absent consumer costs the
/// data path nothing.
#[derive(Debug, Clone)]
pub enum ProxyEvent {
    /// Request line as received from the client, terminators stripped.
    RequestLine(String),
    /// One header line as received, terminators stripped.
    Header(String),
    /// One chunk of upstream response bytes as relayed.
    ResponseChunk(Bytes),
    /// Total bytes relayed process-wide, read after the chunk that moved it.
    BytesTransferred(u64),
}

/// Non-blocking fan-out handle for [`ProxyEvent`]s.
///
/// Cloned into every connection task. `emit` drops the event when the
/// channel is full or closed rather than stalling the relay.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::Sender<ProxyEvent>>,
}

impl EventSink {
    /// Sink wired to a bounded channel; the receiver side is the observer.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProxyEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// Sink that discards everything. Used when nothing is observing.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// True when a receiver was attached. Lets callers skip building
    /// payloads that would only be thrown away.
    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn emit(&self, event: ProxyEvent) {
        if let Some(tx) = &self.tx {
            // Lossy on backpressure. The counter itself lives in the
            // metrics registry, so dropped notifications lose nothing.
            let _ = tx.try_send(event);
        }
    }
}
