use thiserror::Error;

/// Errors raised while relaying a single proxied exchange.
///
/// `Bind` is the only fatal variant; everything else is scoped to one
/// connection and abandons it without touching the client socket further.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    #[error("connection closed before a request line was received")]
    NoRequestLine,

    #[error("missing or empty Host header")]
    InvalidHostHeader,

    #[error("malformed request target: {0}")]
    MalformedTarget(String),

    #[error("upstream {host}:{port} unreachable: {reason}")]
    UpstreamUnreachable {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("relay IO error: {0}")]
    Relay(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<url::ParseError> for ProxyError {
    fn from(err: url::ParseError) -> Self {
        ProxyError::MalformedTarget(err.to_string())
    }
}
