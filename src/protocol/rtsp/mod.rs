//! Sans-IO parser and renderer for the two text control protocols
//!
//! Both protocols share one framing: a request line, `Name: value` headers,
//! a blank line and an optional `Content-Length` body. The leading token of
//! the request line decides which protocol a message belongs to.

pub mod headers;
pub mod request;
pub mod response;
pub mod server_codec;
pub mod transport;


pub use headers::Headers;
pub use request::Request;
pub use response::{Response, StatusCode};
pub use server_codec::{Decoded, ParseError, RequestCodec, ResponseBuilder, encode_response};
pub use transport::{TransportHeader, TransportParseError};

use std::str::FromStr;

/// Version string on Streaming responses
pub const RTSP_VERSION: &str = "RTSP/1.0";

/// Version string on Discovery responses
pub const HTTP_VERSION: &str = "HTTP/1.1";

/// Value of the `Server` header on every response
pub const SERVER_AGENT: &str = "AirPlay/220.68";

/// Which of the two control protocols a method belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    /// HTTP-like capability queries
    Discovery,
    /// RTSP-like streaming negotiation
    Streaming,
}

/// Recognized request methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Capability query
    Options,
    /// Capability fetch
    Get,
    /// Capability post
    Post,
    /// Announce stream description
    Announce,
    /// Negotiate transport, assigns the session id
    Setup,
    /// Start streaming
    Record,
    /// Pause playback
    Pause,
    /// Flush buffered audio
    Flush,
    /// End the session
    Teardown,
    /// Set a parameter (volume)
    SetParameter,
}

impl Method {
    /// Wire token
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Announce => "ANNOUNCE",
            Method::Setup => "SETUP",
            Method::Record => "RECORD",
            Method::Pause => "PAUSE",
            Method::Flush => "FLUSH",
            Method::Teardown => "TEARDOWN",
            Method::SetParameter => "SET_PARAMETER",
        }
    }

    /// Protocol this method is spoken in
    #[must_use]
    pub fn protocol(&self) -> ProtocolKind {
        match self {
            Method::Options | Method::Get | Method::Post => ProtocolKind::Discovery,
            _ => ProtocolKind::Streaming,
        }
    }
}

impl FromStr for Method {
    type Err = ();

    /// Tokens are case-sensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPTIONS" => Ok(Method::Options),
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "ANNOUNCE" => Ok(Method::Announce),
            "SETUP" => Ok(Method::Setup),
            "RECORD" => Ok(Method::Record),
            "PAUSE" => Ok(Method::Pause),
            "FLUSH" => Ok(Method::Flush),
            "TEARDOWN" => Ok(Method::Teardown),
            "SET_PARAMETER" => Ok(Method::SetParameter),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
