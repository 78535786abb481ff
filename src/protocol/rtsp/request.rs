use super::{Headers, Method, ProtocolKind, headers::names};

/// A parsed control request
///
/// Transient: produced by [`RequestCodec`](super::RequestCodec) and dropped
/// once the dispatcher has answered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Method token
    pub method: Method,
    /// Target path, `*` when the request line omits it
    pub target: String,
    /// Version token (`RTSP/1.0`, `HTTP/1.1`) if present
    pub version: Option<String>,
    /// Request headers
    pub headers: Headers,
    /// Request body (may be empty)
    pub body: Vec<u8>,
}

impl Request {
    /// Create a bare request for `method`
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            version: None,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Create a builder for constructing requests
    pub fn builder(method: Method, target: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, target)
    }

    /// Protocol the method belongs to
    #[must_use]
    pub fn protocol(&self) -> ProtocolKind {
        self.method.protocol()
    }

    /// `CSeq` text exactly as received
    #[must_use]
    pub fn cseq_raw(&self) -> Option<&str> {
        self.headers.cseq_raw()
    }

    /// Body as UTF-8 text, if it is
    #[must_use]
    pub fn body_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Encode request to bytes
    ///
    /// Used by peers and tests; the receiver itself only decodes requests.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(128 + self.body.len());

        output.extend_from_slice(self.method.as_str().as_bytes());
        output.push(b' ');
        output.extend_from_slice(self.target.as_bytes());
        if let Some(ref version) = self.version {
            output.push(b' ');
            output.extend_from_slice(version.as_bytes());
        }
        output.extend_from_slice(b"\r\n");

        for (name, value) in self.headers.iter() {
            if name.eq_ignore_ascii_case(names::CONTENT_LENGTH) {
                continue;
            }
            output.extend_from_slice(name.as_bytes());
            output.extend_from_slice(b": ");
            output.extend_from_slice(value.as_bytes());
            output.extend_from_slice(b"\r\n");
        }

        if !self.body.is_empty() {
            let len_header = format!("{}: {}\r\n", names::CONTENT_LENGTH, self.body.len());
            output.extend_from_slice(len_header.as_bytes());
        }

        output.extend_from_slice(b"\r\n");
        output.extend_from_slice(&self.body);

        output
    }
}

/// Builder for requests
#[derive(Debug)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Create a new builder
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            request: Request::new(method, target),
        }
    }

    /// Set the version token
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.request.version = Some(version.into());
        self
    }

    /// Set the `CSeq` header
    #[must_use]
    pub fn cseq(self, cseq: u32) -> Self {
        self.header(names::CSEQ, cseq.to_string())
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.insert(name, value);
        self
    }

    /// Set a body with its content type
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>, content_type: &str) -> Self {
        self.request.body = body.into();
        self.request.headers.insert(names::CONTENT_TYPE, content_type);
        self
    }

    /// Finish
    #[must_use]
    pub fn build(self) -> Request {
        self.request
    }
}
