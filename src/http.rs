//! Minimal HTTP/1.1 framing over an arbitrary byte stream.
//!
//! The pipe speaks HTTP semantics, not a full HTTP stack: a request is a
//! header block framing a body, a response is a status line, three headers,
//! and a body, then the connection is done.  Any request method is accepted
//! — only the body matters.
//!
//! A framed request with a `Content-Length` header is answered as soon as
//! that many body bytes have arrived; the client may keep its write side
//! open while waiting for the response, as conforming HTTP/1.1 clients do.
//! Without `Content-Length` the body runs to end-of-stream.  Clients that
//! skip the HTTP request line entirely and write a bare JSON body are also
//! accepted; the whole payload is then treated as the body.

use std::io::{Read, Write};

/// Errors produced while reading a request off the stream.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("empty request")]
    Empty,
    #[error("request ended before it was complete")]
    Truncated,
}

/// A response to be written back over the pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    /// A plain-text response.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.into().into_bytes(),
        }
    }

    /// A JSON response.
    pub fn json(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: "application/json",
            body,
        }
    }

    /// A response with an empty body.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: Vec::new(),
        }
    }
}

/// Read the request body from `stream`.
///
/// If the payload opens with an HTTP/1.x request line, the header block is
/// parsed and the body is framed by `Content-Length` when that header is
/// present (exactly that many bytes are read — no EOF required), falling
/// back to read-to-EOF when it is absent.  A payload without a request line
/// is read to EOF and is the body in its entirety.
pub fn read_request_body(stream: &mut impl Read) -> Result<Vec<u8>, HttpError> {
    let mut payload = Vec::new();
    let mut chunk = [0u8; 4096];

    // Read until the header terminator or EOF, whichever comes first.
    let header_end = loop {
        if let Some(pos) = find_header_end(&payload) {
            break Some(pos);
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break None;
        }
        payload.extend_from_slice(&chunk[..n]);
    };

    if payload.is_empty() {
        return Err(HttpError::Empty);
    }

    if !starts_with_request_line(&payload) {
        // Bare payload: everything up to EOF is the body.
        stream.read_to_end(&mut payload)?;
        return Ok(payload);
    }

    let body_start = header_end.ok_or(HttpError::Truncated)?;

    match content_length(&payload[..body_start]) {
        Some(length) => {
            let mut body = payload[body_start..].to_vec();
            while body.len() < length {
                let n = stream.read(&mut chunk)?;
                if n == 0 {
                    return Err(HttpError::Truncated);
                }
                body.extend_from_slice(&chunk[..n]);
            }
            body.truncate(length);
            Ok(body)
        }
        None => {
            let mut body = payload[body_start..].to_vec();
            stream.read_to_end(&mut body)?;
            Ok(body)
        }
    }
}

/// The `Content-Length` value from a header block, if present.
fn content_length(header: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(header).ok()?;
    for line in text.split("\r\n").skip(1) {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

/// Whether the payload's first line looks like `<method> <target> HTTP/1.x`.
fn starts_with_request_line(payload: &[u8]) -> bool {
    let line_end = match payload.iter().position(|&b| b == b'\n') {
        Some(i) => i,
        None => return false,
    };
    let line = match std::str::from_utf8(&payload[..line_end]) {
        Ok(l) => l.trim_end_matches('\r'),
        Err(_) => return false,
    };
    let mut parts = line.split(' ');
    matches!(
        (parts.next(), parts.next(), parts.next(), parts.next()),
        (Some(method), Some(_target), Some(version), None)
            if !method.is_empty() && version.starts_with("HTTP/1.")
    )
}

/// Byte offset just past the `\r\n\r\n` header terminator, if present.
fn find_header_end(payload: &[u8]) -> Option<usize> {
    payload
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
}

/// Write `response` to `stream` with `Connection: close` semantics.
pub fn write_response(stream: &mut impl Write, response: &Response) -> std::io::Result<()> {
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        reason_phrase(response.status),
        response.content_type,
        response.body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(&response.body)?;
    stream.flush()
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
