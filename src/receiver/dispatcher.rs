//! Request dispatch for the receiver
//!
//! Dispatch is pure apart from mutating the one [`Session`] it is given: it
//! returns the response to write, any collaborator notification, and whether
//! the connection should close. No I/O is performed.

use tracing::{debug, info, warn};

use crate::protocol::crypto::{base64_decode, base64_encode};
use crate::protocol::pairing::PairingError;
use crate::protocol::rtsp::{
    Decoded, HTTP_VERSION, Method, ProtocolKind, Request, Response, ResponseBuilder,
    SERVER_AGENT, StatusCode, TransportHeader, headers::names,
};
use crate::receiver::session::{Session, SessionState};
use crate::receiver::volume::parse_volume_parameter;

/// Content type of the Discovery capability descriptor
pub const CAPABILITY_CONTENT_TYPE: &str = "text/x-apple-plist+xml";

/// Collaborator notification produced by a request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Notification {
    /// RECORD accepted
    Play,
    /// PAUSE accepted
    Pause,
    /// FLUSH accepted
    Flush,
    /// TEARDOWN accepted
    Stop,
    /// Linear volume from SET_PARAMETER
    Volume(f32),
}

/// Result of dispatching one decoded message
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Response to send back, if any
    pub response: Option<Response>,
    /// Notification for collaborators
    pub notification: Option<Notification>,
    /// Close the connection once the response is flushed
    pub close: bool,
}

impl Outcome {
    fn reply(response: Response) -> Self {
        Self {
            response: Some(response),
            notification: None,
            close: false,
        }
    }

    fn silent() -> Self {
        Self {
            response: None,
            notification: None,
            close: false,
        }
    }

    fn notify(mut self, notification: Notification) -> Self {
        self.notification = Some(notification);
        self
    }

    fn closing(mut self) -> Self {
        self.close = true;
        self
    }
}

/// Dispatch one decoded message against its session
#[must_use]
pub fn dispatch(decoded: Decoded, session: &mut Session) -> Outcome {
    match decoded {
        Decoded::Unrecognized { token } => {
            // No reply and no activity refresh; idle eviction reaps the peer
            debug!(peer = %session.peer(), token = %token, "ignoring unrecognized request");
            Outcome::silent()
        }
        Decoded::Request(request) => {
            session.touch();
            match request.protocol() {
                ProtocolKind::Discovery => handle_discovery(&request),
                ProtocolKind::Streaming => handle_streaming(&request, session),
            }
        }
    }
}

/// Fixed capability descriptor; no state change
fn handle_discovery(request: &Request) -> Outcome {
    let mut builder = ResponseBuilder::ok()
        .version(HTTP_VERSION)
        .header(names::CONTENT_TYPE, CAPABILITY_CONTENT_TYPE)
        .header(names::CONTENT_LENGTH, "0")
        .header(names::SERVER, SERVER_AGENT);
    if let Some(cseq) = request.cseq_raw() {
        builder = builder.cseq(cseq);
    }

    debug!(method = %request.method, target = %request.target, "discovery request");
    Outcome::reply(builder.build())
}

/// Unsigned decimal of any width; echoed as written
fn is_sequence_number(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn handle_streaming(request: &Request, session: &mut Session) -> Outcome {
    let Some(cseq) = request.cseq_raw().filter(|c| is_sequence_number(c)) else {
        warn!(
            peer = %session.peer(),
            method = %request.method,
            cseq = ?request.cseq_raw(),
            "streaming request without a valid CSeq"
        );
        let mut builder = ResponseBuilder::error(StatusCode::BAD_REQUEST)
            .header(names::SERVER, SERVER_AGENT);
        if let Some(raw) = request.cseq_raw() {
            builder = builder.cseq(raw);
        }
        return Outcome::reply(builder.build());
    };

    match request.method {
        Method::Announce => handle_announce(cseq, session),
        Method::Setup => handle_setup(request, cseq, session),
        Method::Record => handle_record(cseq, session),
        Method::Pause => handle_in_recording(Method::Pause, cseq, session, Notification::Pause),
        Method::Flush => handle_in_recording(Method::Flush, cseq, session, Notification::Flush),
        Method::Teardown => handle_teardown(cseq, session),
        Method::SetParameter => handle_set_parameter(request, cseq, session),
        Method::Options | Method::Get | Method::Post => handle_discovery(request),
    }
}

/// Base of every Streaming response: echoed CSeq, Server, Session if assigned
fn streaming_response(status: StatusCode, cseq: &str, session: &Session) -> ResponseBuilder {
    let builder = ResponseBuilder::new(status)
        .cseq(cseq)
        .header(names::SERVER, SERVER_AGENT);
    match session.id() {
        Some(id) => builder.session(id),
        None => builder,
    }
}

fn invalid_state(method: Method, cseq: &str, session: &Session) -> Outcome {
    warn!(
        peer = %session.peer(),
        method = %method,
        state = %session.state(),
        cseq,
        "method not valid in this state"
    );
    Outcome::reply(streaming_response(StatusCode::METHOD_NOT_VALID, cseq, session).build())
}

/// Apply a transition, or answer 455
fn transition(
    method: Method,
    to: SessionState,
    cseq: &str,
    session: &mut Session,
) -> Result<(), Outcome> {
    let from = session.state();
    session
        .set_state(to)
        .map_err(|_| invalid_state(method, cseq, session))?;
    info!(peer = %session.peer(), from = %from, to = %to, cseq, "session state changed");
    Ok(())
}

fn handle_announce(cseq: &str, session: &mut Session) -> Outcome {
    if let Err(outcome) = transition(Method::Announce, SessionState::Announced, cseq, session) {
        return outcome;
    }
    Outcome::reply(streaming_response(StatusCode::OK, cseq, session).build())
}

fn handle_setup(request: &Request, cseq: &str, session: &mut Session) -> Outcome {
    if session.state() != SessionState::Announced {
        return invalid_state(Method::Setup, cseq, session);
    }

    if !session.is_authenticated() {
        if let Some(outcome) = authenticate(request, cseq, session) {
            return outcome;
        }
    }

    let transport = match TransportHeader::negotiate(request.headers.get(names::TRANSPORT)) {
        Ok(transport) => transport,
        Err(e) => {
            warn!(peer = %session.peer(), error = %e, cseq, "bad Transport header");
            return Outcome::reply(
                streaming_response(StatusCode::BAD_REQUEST, cseq, session).build(),
            );
        }
    };

    if let Err(outcome) = transition(Method::Setup, SessionState::Setup, cseq, session) {
        return outcome;
    }
    let id = session.assign_id().to_string();
    debug!(peer = %session.peer(), session_id = %id, "session id assigned");

    Outcome::reply(
        streaming_response(StatusCode::OK, cseq, session)
            .header(names::TRANSPORT, &transport.to_response_header())
            .build(),
    )
}

/// Run the pairing exchange carried on SETUP
///
/// Returns `None` once the session is authenticated, otherwise the
/// challenge, rejection or lockout response.
fn authenticate(request: &Request, cseq: &str, session: &mut Session) -> Option<Outcome> {
    let peer = session.peer();
    let gate = session.pairing_mut()?;

    if let Some(encoded) = request.headers.get(names::PAIRING_RESPONSE) {
        // Undecodable answers still consume the challenge and count as a failure
        let response = base64_decode(encoded).unwrap_or_default();
        match gate.submit(&response) {
            Ok(_) => {
                info!(peer = %peer, cseq, "pairing accepted");
                return None;
            }
            Err(PairingError::LockedOut) => {
                warn!(peer = %peer, cseq, "pairing locked out, closing session");
                return Some(
                    Outcome::reply(
                        streaming_response(StatusCode::FORBIDDEN, cseq, session).build(),
                    )
                    .closing(),
                );
            }
            Err(e) => warn!(peer = %peer, cseq, error = %e, "pairing rejected"),
        }
    }

    let issued = gate
        .issue_challenge()
        .map(|challenge| base64_encode(challenge.bytes()));
    let challenge = match issued {
        Ok(challenge) => challenge,
        Err(PairingError::LockedOut) => {
            return Some(
                Outcome::reply(streaming_response(StatusCode::FORBIDDEN, cseq, session).build())
                    .closing(),
            );
        }
        Err(e) => {
            warn!(peer = %peer, error = %e, "could not issue pairing challenge");
            return Some(Outcome::reply(
                streaming_response(StatusCode::INTERNAL_ERROR, cseq, session).build(),
            ));
        }
    };

    debug!(peer = %peer, cseq, "pairing challenge issued");
    Some(Outcome::reply(
        streaming_response(StatusCode::UNAUTHORIZED, cseq, session)
            .header(names::PAIRING_CHALLENGE, &challenge)
            .build(),
    ))
}

fn handle_record(cseq: &str, session: &mut Session) -> Outcome {
    if let Err(outcome) = transition(Method::Record, SessionState::Recording, cseq, session) {
        return outcome;
    }
    Outcome::reply(streaming_response(StatusCode::OK, cseq, session).build())
        .notify(Notification::Play)
}

/// PAUSE and FLUSH: valid only while recording, state unchanged
fn handle_in_recording(
    method: Method,
    cseq: &str,
    session: &mut Session,
    notification: Notification,
) -> Outcome {
    if !session.state().is_recording() {
        return invalid_state(method, cseq, session);
    }
    Outcome::reply(streaming_response(StatusCode::OK, cseq, session).build()).notify(notification)
}

/// TEARDOWN: always closes; only a recording session stops playback
fn handle_teardown(cseq: &str, session: &mut Session) -> Outcome {
    let was_recording = session.state().is_recording();
    if let Err(outcome) = transition(Method::Teardown, SessionState::TornDown, cseq, session) {
        return outcome.closing();
    }
    let outcome =
        Outcome::reply(streaming_response(StatusCode::OK, cseq, session).build()).closing();
    if was_recording {
        outcome.notify(Notification::Stop)
    } else {
        outcome
    }
}

fn handle_set_parameter(request: &Request, cseq: &str, session: &mut Session) -> Outcome {
    if !session.state().is_set_up() {
        return invalid_state(Method::SetParameter, cseq, session);
    }

    let outcome = Outcome::reply(streaming_response(StatusCode::OK, cseq, session).build());
    match request.body_text().and_then(parse_volume_parameter) {
        Some(update) => {
            debug!(peer = %session.peer(), db = update.db, linear = update.linear, "volume change");
            outcome.notify(Notification::Volume(update.linear))
        }
        None => outcome,
    }
}
