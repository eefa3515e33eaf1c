//! Integration tests for the end-to-end relay path

use heimdall_relay::ProxyListener;
use heimdall_relay::config::Config;
use heimdall_relay::events::EventSink;
use heimdall_relay::metrics::RelayMetrics;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

/// Origin server for exactly one connection: records the request head it
/// receives, optionally waits for `gate`, then writes `body` and closes.
async fn spawn_origin(
    body: Vec<u8>,
    gate: Option<oneshot::Receiver<()>>,
) -> (SocketAddr, tokio::task::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
            if received.ends_with(b"\r\n\r\n") {
                break;
            }
        }
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        stream.write_all(&body).await.unwrap();
        drop(stream);

        String::from_utf8(received)
            .unwrap()
            .split("\r\n")
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect()
    });
    (addr, handle)
}

/// Proxy bound to an ephemeral port, accept loop running in the background.
async fn spawn_proxy(config: Config, metrics: Arc<RelayMetrics>) -> SocketAddr {
    let listener = ProxyListener::bind(&config, metrics, EventSink::disabled())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run());
    addr
}

fn ephemeral_config() -> Config {
    let mut config = Config::default();
    config.listen_addr = "127.0.0.1:0".parse().unwrap();
    config
}

/// Sends one raw request and collects whatever the proxy sends back until
/// the connection closes. An abrupt reset still counts as closed.
async fn exchange(proxy: SocketAddr, request: String) -> Vec<u8> {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response).await;
    response
}

async fn wait_until<F: Fn() -> bool>(cond: F, what: &str) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Test that an absolute-form target is rewritten to origin form while the
/// header block is replayed byte for byte, and the response comes back
/// verbatim.
#[tokio::test]
async fn test_rewrites_target_and_replays_headers() {
    let response_bytes = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello".to_vec();
    let (origin_addr, origin) = spawn_origin(response_bytes.clone(), None).await;

    let metrics = Arc::new(RelayMetrics::new());
    let proxy = spawn_proxy(ephemeral_config(), Arc::clone(&metrics)).await;

    let request = format!(
        "GET http://example.com/foo?x=1 HTTP/1.1\r\n\
         Host: {origin_addr}\r\n\
         User-Agent: relay-test\r\n\
         \r\n"
    );
    let response = exchange(proxy, request).await;

    let head = origin.await.unwrap();
    assert_eq!(head[0], "GET /foo?x=1 HTTP/1.1");
    assert_eq!(head[1], format!("Host: {origin_addr}"));
    assert_eq!(head[2], "User-Agent: relay-test");

    assert_eq!(response, response_bytes);
    assert_eq!(metrics.transferred(), response_bytes.len() as u64);
}

/// Test that a target with no path is forwarded as `/`.
#[tokio::test]
async fn test_bare_authority_target_becomes_slash() {
    let (origin_addr, origin) =
        spawn_origin(b"HTTP/1.1 204 No Content\r\n\r\n".to_vec(), None).await;

    let metrics = Arc::new(RelayMetrics::new());
    let proxy = spawn_proxy(ephemeral_config(), Arc::clone(&metrics)).await;

    let request = format!("GET http://example.com HTTP/1.1\r\nHost: {origin_addr}\r\n\r\n");
    exchange(proxy, request).await;

    let head = origin.await.unwrap();
    assert_eq!(head[0], "GET / HTTP/1.1");
}

/// Test that headers are forwarded in arrival order, duplicates and odd
/// spacing included.
#[tokio::test]
async fn test_duplicate_headers_survive_in_order() {
    let (origin_addr, origin) = spawn_origin(b"ok".to_vec(), None).await;

    let metrics = Arc::new(RelayMetrics::new());
    let proxy = spawn_proxy(ephemeral_config(), Arc::clone(&metrics)).await;

    let request = format!(
        "GET http://example.com/ HTTP/1.1\r\n\
         Host: {origin_addr}\r\n\
         X-Trace: one\r\n\
         X-Trace:  two \r\n\
         Accept:*/*\r\n\
         \r\n"
    );
    exchange(proxy, request).await;

    let head = origin.await.unwrap();
    assert_eq!(
        &head[1..],
        &[
            format!("Host: {origin_addr}"),
            "X-Trace: one".to_string(),
            "X-Trace:  two ".to_string(),
            "Accept:*/*".to_string(),
        ]
    );
}

/// Test that a request without a Host header is abandoned before any
/// upstream contact: the client connection closes with zero bytes and the
/// transfer counter stays put.
#[tokio::test]
async fn test_missing_host_abandons_connection() {
    let metrics = Arc::new(RelayMetrics::new());
    let proxy = spawn_proxy(ephemeral_config(), Arc::clone(&metrics)).await;

    let response = exchange(
        proxy,
        "GET http://example.com/ HTTP/1.1\r\nAccept: */*\r\n\r\n".to_string(),
    )
    .await;

    assert!(response.is_empty());
    let metrics_done = Arc::clone(&metrics);
    wait_until(
        move || metrics_done.summary().connection_errors == 1,
        "the abandoned connection to be counted",
    )
    .await;
    assert_eq!(metrics.transferred(), 0);
}

/// Test that an unreachable upstream abandons the exchange: nothing is
/// written to the client and the counter is unchanged.
#[tokio::test]
async fn test_refused_upstream_abandons_connection() {
    // Bind and drop to get a port with nothing listening on it.
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = unused.local_addr().unwrap();
    drop(unused);

    let metrics = Arc::new(RelayMetrics::new());
    let proxy = spawn_proxy(ephemeral_config(), Arc::clone(&metrics)).await;

    let response = exchange(
        proxy,
        format!("GET http://example.com/ HTTP/1.1\r\nHost: {dead_addr}\r\n\r\n"),
    )
    .await;

    assert!(response.is_empty());
    let metrics_done = Arc::clone(&metrics);
    wait_until(
        move || metrics_done.summary().connection_errors == 1,
        "the failed dial to be counted",
    )
    .await;
    assert_eq!(metrics.transferred(), 0);
}

/// Test that the transfer counter accumulates across sequential exchanges
/// without ever resetting.
#[tokio::test]
async fn test_counter_accumulates_across_exchanges() {
    let metrics = Arc::new(RelayMetrics::new());
    let proxy = spawn_proxy(ephemeral_config(), Arc::clone(&metrics)).await;

    let (first_addr, _first) = spawn_origin(vec![b'a'; 100], None).await;
    let response = exchange(
        proxy,
        format!("GET http://example.com/a HTTP/1.1\r\nHost: {first_addr}\r\n\r\n"),
    )
    .await;
    assert_eq!(response.len(), 100);
    assert_eq!(metrics.transferred(), 100);

    let (second_addr, _second) = spawn_origin(vec![b'b'; 200], None).await;
    let response = exchange(
        proxy,
        format!("GET http://example.com/b HTTP/1.1\r\nHost: {second_addr}\r\n\r\n"),
    )
    .await;
    assert_eq!(response.len(), 200);
    assert_eq!(metrics.transferred(), 300);
}

/// Test that two concurrent exchanges both land in the counter with no
/// lost updates.
#[tokio::test]
async fn test_concurrent_exchanges_share_counter() {
    let metrics = Arc::new(RelayMetrics::new());
    let proxy = spawn_proxy(ephemeral_config(), Arc::clone(&metrics)).await;

    let (first_addr, _first) = spawn_origin(vec![b'x'; 100], None).await;
    let (second_addr, _second) = spawn_origin(vec![b'y'; 200], None).await;

    let (first_response, second_response) = tokio::join!(
        exchange(
            proxy,
            format!("GET http://example.com/1 HTTP/1.1\r\nHost: {first_addr}\r\n\r\n"),
        ),
        exchange(
            proxy,
            format!("GET http://example.com/2 HTTP/1.1\r\nHost: {second_addr}\r\n\r\n"),
        ),
    );

    assert_eq!(first_response, vec![b'x'; 100]);
    assert_eq!(second_response, vec![b'y'; 200]);
    assert_eq!(metrics.transferred(), 300);
    assert_eq!(metrics.summary().connections_total, 2);
    assert_eq!(metrics.summary().connection_errors, 0);
}

/// Test that admission is bounded: with a single permit, a second client
/// is not accepted until the first exchange finishes.
#[tokio::test]
async fn test_admission_respects_connection_cap() {
    let (gate_tx, gate_rx) = oneshot::channel();
    let (slow_addr, slow) = spawn_origin(vec![b's'; 10], Some(gate_rx)).await;
    let (fast_addr, _fast) = spawn_origin(vec![b'f'; 10], None).await;

    let mut config = ephemeral_config();
    config.max_connections = 1;
    let metrics = Arc::new(RelayMetrics::new());
    let proxy = spawn_proxy(config, Arc::clone(&metrics)).await;

    let first = tokio::spawn(exchange(
        proxy,
        format!("GET http://example.com/slow HTTP/1.1\r\nHost: {slow_addr}\r\n\r\n"),
    ));
    let metrics_opened = Arc::clone(&metrics);
    wait_until(
        move || metrics_opened.summary().connections_total == 1,
        "the first connection to be admitted",
    )
    .await;

    let second = tokio::spawn(exchange(
        proxy,
        format!("GET http://example.com/fast HTTP/1.1\r\nHost: {fast_addr}\r\n\r\n"),
    ));

    // The second client connects into the backlog but must not be served
    // while the only permit is held.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(metrics.summary().connections_total, 1);

    gate_tx.send(()).unwrap();
    assert_eq!(first.await.unwrap(), vec![b's'; 10]);
    assert_eq!(second.await.unwrap(), vec![b'f'; 10]);
    assert_eq!(metrics.summary().connections_total, 2);
    slow.await.unwrap();
}

/// Test that the relay serves exactly one exchange per connection and then
/// closes its end.
#[tokio::test]
async fn test_connection_closes_after_one_exchange() {
    let (origin_addr, _origin) = spawn_origin(b"done".to_vec(), None).await;

    let metrics = Arc::new(RelayMetrics::new());
    let proxy = spawn_proxy(ephemeral_config(), Arc::clone(&metrics)).await;

    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream
        .write_all(
            format!("GET http://example.com/ HTTP/1.1\r\nHost: {origin_addr}\r\n\r\n").as_bytes(),
        )
        .await
        .unwrap();

    // read_to_end only returns once the proxy has shut the connection.
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert_eq!(response, b"done");
}
