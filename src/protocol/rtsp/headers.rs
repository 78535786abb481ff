/// Well-known header names
pub mod names {
    pub const CSEQ: &str = "CSeq";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const SESSION: &str = "Session";
    pub const TRANSPORT: &str = "Transport";
    pub const SERVER: &str = "Server";
    /// Base64 challenge issued by the receiver
    pub const PAIRING_CHALLENGE: &str = "X-Pairing-Challenge";
    /// Base64 HMAC answer from the client
    pub const PAIRING_RESPONSE: &str = "X-Pairing-Response";
}

/// Header collection
///
/// Names compare case-insensitively. Inserting a name that is already present
/// replaces the earlier value, so the last occurrence on the wire wins.
/// Iteration follows insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Create empty headers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any case-insensitive match
    ///
    /// The new name casing is kept and the entry moves to the end.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.inner.push((name, value.into()));
    }

    /// Get header value (case-insensitive)
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Remove a header, returning its value
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self
            .inner
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        Some(self.inner.remove(pos).1)
    }

    /// Check if header exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// `CSeq` exactly as the client sent it
    #[must_use]
    pub fn cseq_raw(&self) -> Option<&str> {
        self.get(names::CSEQ)
    }

    /// `CSeq` as a number
    #[must_use]
    pub fn cseq(&self) -> Option<u32> {
        self.cseq_raw()?.parse().ok()
    }

    /// Get Content-Length value
    #[must_use]
    pub fn content_length(&self) -> Option<usize> {
        self.get(names::CONTENT_LENGTH)?.parse().ok()
    }

    /// Get Session ID
    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.get(names::SESSION)
    }

    /// Iterate over all headers in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}
