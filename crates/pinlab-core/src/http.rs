//! Minimal HTTP/1.1 exchange: one uncached GET, status line and headers only

use httparse::{Response, Status};
use tokio::io::{AsyncRead, AsyncReadExt};
use url::{Position, Url};

use pinlab_types::{RequestError, TransportErrorKind};

/// Maximum number of response headers accepted
const MAX_HEADERS: usize = 64;

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn protocol_error(message: impl Into<String>) -> RequestError {
    RequestError::transport(TransportErrorKind::Protocol, message)
}

/// Build the GET request for `url`
///
/// Every request opts out of caching and asks the server to close the
/// connection, so nothing is reused by a later execution.
pub(crate) fn build_get_request(url: &Url, user_agent: &str) -> Vec<u8> {
    let target = match &url[Position::BeforePath..Position::AfterQuery] {
        "" => "/",
        target => target,
    };
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    };

    let headers = [
        ("Host", host.as_str()),
        ("User-Agent", user_agent),
        ("Accept", "*/*"),
        ("Cache-Control", "no-cache"),
        ("Pragma", "no-cache"),
        ("Connection", "close"),
    ];

    let mut request = format!("GET {} HTTP/1.1\r\n", target);
    for (name, value) in headers {
        request.push_str(&format!("{}: {}\r\n", name, value));
    }
    request.push_str("\r\n");
    request.into_bytes()
}

/// Read up to and including the blank line that ends the response head
///
/// Bytes after the head may be included. Fails once `limit` bytes have been
/// read without finding the end of the head.
pub(crate) async fn read_response_head<S>(
    stream: &mut S,
    limit: usize,
) -> Result<Vec<u8>, RequestError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(4 * 1024);
    let mut tmp = [0u8; 4096];

    loop {
        let n = stream.read(&mut tmp).await.map_err(|e| {
            RequestError::transport(TransportErrorKind::Io, format!("read error: {}", e))
        })?;
        if n == 0 {
            return Err(protocol_error("connection closed before headers completed"));
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = find_headers_end(&buf) {
            buf.truncate(pos + 4);
            return Ok(buf);
        }
        if buf.len() > limit {
            return Err(protocol_error(format!(
                "response head exceeds {} bytes",
                limit
            )));
        }
    }
}

/// Status code of a complete response head
pub(crate) fn parse_status(head: &[u8]) -> Result<u16, RequestError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = Response::new(&mut headers);

    match response.parse(head) {
        Ok(Status::Complete(_)) => response
            .code
            .ok_or_else(|| protocol_error("missing HTTP status code")),
        Ok(Status::Partial) => Err(protocol_error("incomplete HTTP response head")),
        Err(e) => Err(protocol_error(format!("HTTP parsing error: {}", e))),
    }
}
