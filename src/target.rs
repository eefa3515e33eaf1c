use crate::error::ProxyError;
use url::Url;

/// Upstream endpoint named by the request's `Host` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub host: String,
    pub port: u16,
}

impl Destination {
    /// Resolves the captured `Host` value into host and port.
    ///
    /// `host:port` splits on the last colon; a bare hostname gets port 80.
    /// An absent or empty header, an empty host part or a port that does
    /// not parse all reject the request.
    pub fn from_host_header(value: Option<&str>) -> Result<Self, ProxyError> {
        let value = value.ok_or(ProxyError::InvalidHostHeader)?;
        if value.is_empty() {
            return Err(ProxyError::InvalidHostHeader);
        }

        let (host, port) = match value.rfind(':') {
            Some(idx) => {
                let port = value[idx + 1..]
                    .parse::<u16>()
                    .map_err(|_| ProxyError::InvalidHostHeader)?;
                (&value[..idx], port)
            }
            None => (value, 80),
        };
        if host.is_empty() {
            return Err(ProxyError::InvalidHostHeader);
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Rewrites a proxy request line into origin form.
///
/// Absolute targets lose scheme and authority and keep path plus query;
/// an authority with no path becomes `/`. Targets already in origin form
/// pass through (modulo URL normalization). Anything else is rejected.
pub fn origin_form(method: &str, target: &str, version: &str) -> Result<String, ProxyError> {
    let url = match Url::parse(target) {
        Ok(url) if url.has_host() => url,
        Ok(_) => return Err(ProxyError::MalformedTarget(target.to_string())),
        Err(url::ParseError::RelativeUrlWithoutBase) if target.starts_with('/') => {
            Url::parse("http://request.invalid/")?.join(target)?
        }
        Err(e) => return Err(e.into()),
    };

    let mut line = format!("{} {}", method, url.path());
    if let Some(query) = url.query() {
        line.push('?');
        line.push_str(query);
    }
    line.push(' ');
    line.push_str(version);
    Ok(line)
}
