use super::Headers;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    /// Method received out of its required prior state
    pub const METHOD_NOT_VALID: StatusCode = StatusCode(455);
    pub const INTERNAL_ERROR: StatusCode = StatusCode(500);

    /// Check if this is a success status (2xx)
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Get status code as u16
    #[must_use]
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Standard reason phrase
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self.0 {
            200 => "OK",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            455 => "Method Not Valid in This State",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            _ => "Unknown",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.0, self.reason())
    }
}

/// A response ready to be serialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Version token (`RTSP/1.0` or `HTTP/1.1`)
    pub version: String,
    /// Status code
    pub status: StatusCode,
    /// Reason phrase (e.g., "OK")
    pub reason: String,
    /// Response headers
    pub headers: Headers,
    /// Response body (may be empty)
    pub body: Vec<u8>,
}

impl Response {
    /// Check if response indicates success
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get `CSeq` from response
    #[must_use]
    pub fn cseq(&self) -> Option<&str> {
        self.headers.cseq_raw()
    }

    /// Get session ID from response
    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.headers.session()
    }

    /// Serialize to wire bytes
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        super::encode_response(self)
    }
}
