//! Receiver-side codec: parses requests and renders responses
//!
//! # Sans-IO Design
//!
//! This codec performs no I/O. It operates on byte buffers:
//! - `feed()` appends bytes read from the socket
//! - `decode()` yields one complete message at a time, so pipelined requests
//!   come out in order and partial ones wait for more bytes
//! - `encode_response()` generates response bytes
//!
//! # Example
//!
//! ```rust
//! use airplay_lite::protocol::rtsp::{Decoded, Method, RequestCodec};
//!
//! let mut codec = RequestCodec::new();
//! codec.feed(b"ANNOUNCE\r\nCSeq: 7\r\n\r\n");
//!
//! match codec.decode().unwrap() {
//!     Some(Decoded::Request(request)) => {
//!         assert_eq!(request.method, Method::Announce);
//!         assert_eq!(request.cseq_raw(), Some("7"));
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

use super::{Headers, Method, Request, Response, StatusCode, headers::names};
use bytes::{Buf, BytesMut};
use std::str::{self, FromStr};

/// Errors during request parsing
///
/// Every variant means the stream can no longer be framed reliably.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid request line: {0}")]
    InvalidRequestLine(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid Content-Length: {0}")]
    InvalidContentLength(String),

    #[error("Header section exceeds {max} bytes")]
    HeadersTooLarge { max: usize },

    #[error("Body too large: {size} > {max}")]
    BodyTooLarge { size: usize, max: usize },

    #[error("Invalid UTF-8 in headers")]
    InvalidUtf8,
}

/// Maximum allowed body size
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Maximum header section size (64 KB)
pub const MAX_HEADER_SIZE: usize = 64 * 1024;

/// One framed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Message with a recognized method token
    Request(Request),
    /// Well-framed message whose leading token is not a known method
    Unrecognized {
        /// The leading token
        token: String,
    },
}

/// Request codec owned by one session
#[derive(Debug)]
pub struct RequestCodec {
    buffer: BytesMut,
}

impl RequestCodec {
    /// Create a new codec
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Feed bytes into the internal buffer
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Get current buffer length
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Attempt to decode one complete message
    ///
    /// Returns:
    /// - `Ok(Some(decoded))` if a complete message was framed
    /// - `Ok(None)` if more data is needed
    /// - `Err(e)` if the input is malformed
    ///
    /// # Errors
    /// Returns `ParseError` if the message is malformed.
    pub fn decode(&mut self) -> Result<Option<Decoded>, ParseError> {
        self.skip_blank_lines();

        let Some(header_end) = self.find_header_end() else {
            if self.buffer.len() > MAX_HEADER_SIZE {
                return Err(ParseError::HeadersTooLarge {
                    max: MAX_HEADER_SIZE,
                });
            }
            return Ok(None);
        };

        if header_end > MAX_HEADER_SIZE {
            return Err(ParseError::HeadersTooLarge {
                max: MAX_HEADER_SIZE,
            });
        }

        let header_str =
            str::from_utf8(&self.buffer[..header_end]).map_err(|_| ParseError::InvalidUtf8)?;
        let head = parse_head(header_str)?;

        let content_length = match head.headers.get(names::CONTENT_LENGTH) {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| ParseError::InvalidContentLength(raw.to_string()))?,
            None => 0,
        };

        if content_length > MAX_BODY_SIZE {
            return Err(ParseError::BodyTooLarge {
                size: content_length,
                max: MAX_BODY_SIZE,
            });
        }

        // headers + \r\n\r\n + body
        let total_size = header_end + 4 + content_length;
        if self.buffer.len() < total_size {
            return Ok(None);
        }

        self.buffer.advance(header_end + 4);
        let body = self.buffer.split_to(content_length).to_vec();

        let Ok(method) = Method::from_str(&head.token) else {
            return Ok(Some(Decoded::Unrecognized { token: head.token }));
        };

        Ok(Some(Decoded::Request(Request {
            method,
            target: head.target,
            version: head.version,
            headers: head.headers,
            body,
        })))
    }

    /// Drop CR/LF between messages
    fn skip_blank_lines(&mut self) {
        let blank = self
            .buffer
            .iter()
            .take_while(|b| matches!(b, b'\r' | b'\n'))
            .count();
        self.buffer.advance(blank);
    }

    /// Find the position of header/body separator (\r\n\r\n)
    fn find_header_end(&self) -> Option<usize> {
        let needle = b"\r\n\r\n";
        self.buffer
            .windows(needle.len())
            .position(|window| window == needle)
    }
}

impl Default for RequestCodec {
    fn default() -> Self {
        Self::new()
    }
}

struct Head {
    token: String,
    target: String,
    version: Option<String>,
    headers: Headers,
}

/// Parse request line and headers
///
/// The request line is `TOKEN [target [version]]`; a bare token is valid.
fn parse_head(header_str: &str) -> Result<Head, ParseError> {
    let mut lines = header_str.lines();

    let request_line = lines
        .next()
        .ok_or_else(|| ParseError::InvalidRequestLine("Empty request".into()))?;

    let mut parts = request_line.split_whitespace();
    let token = parts
        .next()
        .ok_or_else(|| ParseError::InvalidRequestLine(request_line.to_string()))?;
    let target = parts.next().unwrap_or("*");
    let version = parts.next();

    if parts.next().is_some() {
        return Err(ParseError::InvalidRequestLine(request_line.to_string()));
    }

    if let Some(version) = version {
        if !version.starts_with("RTSP/") && !version.starts_with("HTTP/") {
            return Err(ParseError::InvalidRequestLine(format!(
                "Invalid protocol: {version}"
            )));
        }
    }

    let mut headers = Headers::new();
    for line in lines {
        if line.is_empty() {
            break;
        }

        let Some(pos) = line.find(':') else {
            return Err(ParseError::InvalidHeader(line.to_string()));
        };
        let name = line[..pos].trim();
        if name.is_empty() {
            return Err(ParseError::InvalidHeader(line.to_string()));
        }
        headers.insert(name, line[pos + 1..].trim());
    }

    Ok(Head {
        token: token.to_string(),
        target: target.to_string(),
        version: version.map(str::to_string),
        headers,
    })
}

/// Builder for responses
///
/// Defaults to the Streaming version token; Discovery responses override it
/// with [`ResponseBuilder::version`].
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    version: &'static str,
    status: StatusCode,
    headers: Headers,
    body: Option<Vec<u8>>,
}

impl ResponseBuilder {
    /// Create a new response builder with the given status
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: super::RTSP_VERSION,
            status,
            headers: Headers::new(),
            body: None,
        }
    }

    /// Create an OK (200) response
    #[must_use]
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Create an error response
    #[must_use]
    pub fn error(status: StatusCode) -> Self {
        Self::new(status)
    }

    /// Override the version token
    #[must_use]
    pub fn version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    /// Echo the request's `CSeq` text
    #[must_use]
    pub fn cseq(mut self, cseq: &str) -> Self {
        self.headers.insert(names::CSEQ, cseq);
        self
    }

    /// Set the Session header
    #[must_use]
    pub fn session(mut self, session_id: &str) -> Self {
        self.headers.insert(names::SESSION, session_id);
        self
    }

    /// Add a custom header
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set a text body (will set Content-Type to text/parameters)
    #[must_use]
    pub fn text_body(mut self, body: &str) -> Self {
        self.body = Some(body.as_bytes().to_vec());
        self.headers.insert(names::CONTENT_TYPE, "text/parameters");
        self
    }

    /// Build into a [`Response`]
    #[must_use]
    pub fn build(mut self) -> Response {
        if let Some(ref body) = self.body {
            self.headers
                .insert(names::CONTENT_LENGTH, body.len().to_string());
        }

        Response {
            version: self.version.to_string(),
            status: self.status,
            reason: self.status.reason().to_string(),
            headers: self.headers,
            body: self.body.unwrap_or_default(),
        }
    }

    /// Encode directly to bytes
    #[must_use]
    pub fn encode(self) -> Vec<u8> {
        encode_response(&self.build())
    }
}

/// Encode a response to bytes
#[must_use]
pub fn encode_response(response: &Response) -> Vec<u8> {
    let mut output = Vec::with_capacity(128 + response.body.len());

    output.extend_from_slice(
        format!(
            "{} {} {}\r\n",
            response.version,
            response.status.as_u16(),
            response.reason
        )
        .as_bytes(),
    );

    for (name, value) in response.headers.iter() {
        output.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }

    output.extend_from_slice(b"\r\n");
    output.extend_from_slice(&response.body);

    output
}
