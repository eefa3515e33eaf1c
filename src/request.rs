use crate::error::ProxyError;
use crate::events::{EventSink, ProxyEvent};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// One parsed client request: the request line plus the raw header block.
///
/// Headers are kept exactly as received (terminators stripped), in order,
/// duplicates included; forwarding replays them byte for byte. Only the
/// first `Host` value is pulled out for routing. The body, if the client
/// sends one, is never read.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: Vec<String>,
    pub host: Option<String>,
}

fn strip_line_ending(line: &mut String) {
    if line.ends_with('\n') {
        line.pop();
    }
    if line.ends_with('\r') {
        line.pop();
    }
}

/// Reads the request line and header block off `reader`, stopping at the
/// blank line (or end of stream) that terminates the headers.
pub async fn read_request<R>(
    reader: &mut R,
    events: &EventSink,
) -> Result<IncomingRequest, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(ProxyError::NoRequestLine);
    }
    strip_line_ending(&mut line);
    events.emit(ProxyEvent::RequestLine(line.clone()));

    let mut parts = line.split_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version), None) => {
            (method.to_string(), target.to_string(), version.to_string())
        }
        _ => return Err(ProxyError::MalformedTarget(line)),
    };

    let mut headers = Vec::new();
    let mut host = None;
    loop {
        let mut header = String::new();
        let n = reader.read_line(&mut header).await?;
        if n == 0 {
            // Stream ended inside the header block; forward what we have.
            break;
        }
        strip_line_ending(&mut header);
        if header.is_empty() {
            break;
        }
        events.emit(ProxyEvent::Header(header.clone()));
        if host.is_none()
            && header.len() >= 5
            && header.as_bytes()[..5].eq_ignore_ascii_case(b"host:")
        {
            host = Some(header[5..].trim().to_string());
        }
        headers.push(header);
    }

    Ok(IncomingRequest {
        method,
        target,
        version,
        headers,
        host,
    })
}
