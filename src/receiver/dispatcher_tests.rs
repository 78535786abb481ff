use super::dispatcher::{CAPABILITY_CONTENT_TYPE, Notification, Outcome, dispatch};
use super::session::{Session, SessionState};
use crate::protocol::crypto::{base64_decode, base64_encode, hmac_sha1};
use crate::protocol::pairing::{PairingGate, PairingKey};
use crate::protocol::rtsp::{
    Decoded, HTTP_VERSION, Method, RTSP_VERSION, Request, Response, SERVER_AGENT, StatusCode,
    headers::names,
};
use proptest::prelude::*;
use std::net::SocketAddr;
use std::sync::Arc;

fn peer() -> SocketAddr {
    "10.0.0.7:50000".parse().unwrap()
}

fn request(method: Method, cseq: u32) -> Decoded {
    Decoded::Request(
        Request::builder(method, "rtsp://10.0.0.1/1")
            .version(RTSP_VERSION)
            .cseq(cseq)
            .build(),
    )
}

fn response(outcome: &Outcome) -> &Response {
    outcome.response.as_ref().expect("expected a response")
}

fn assert_status(outcome: &Outcome, status: StatusCode, cseq: &str) {
    let resp = response(outcome);
    assert_eq!(resp.status, status);
    assert_eq!(resp.version, RTSP_VERSION);
    assert_eq!(resp.cseq(), Some(cseq));
    assert_eq!(resp.headers.get(names::SERVER), Some(SERVER_AGENT));
}

/// Drive a fresh session to `Setup`
fn set_up_session() -> Session {
    let mut session = Session::new(peer(), None);
    dispatch(request(Method::Announce, 1), &mut session);
    dispatch(request(Method::Setup, 2), &mut session);
    assert_eq!(session.state(), SessionState::Setup);
    session
}

#[test]
fn test_happy_path_echoes_cseq() {
    let mut session = Session::new(peer(), None);

    let announce = dispatch(request(Method::Announce, 7), &mut session);
    assert_status(&announce, StatusCode::OK, "7");
    assert_eq!(session.state(), SessionState::Announced);
    assert!(response(&announce).session().is_none());

    let setup = dispatch(request(Method::Setup, 8), &mut session);
    assert_status(&setup, StatusCode::OK, "8");
    assert_eq!(session.state(), SessionState::Setup);
    let id = response(&setup).session().unwrap().to_string();
    assert_eq!(session.id(), Some(id.as_str()));
    assert!(response(&setup).headers.get(names::TRANSPORT).is_some());

    let record = dispatch(request(Method::Record, 9), &mut session);
    assert_status(&record, StatusCode::OK, "9");
    assert_eq!(record.notification, Some(Notification::Play));
    assert_eq!(response(&record).session(), Some(id.as_str()));
    assert_eq!(session.state(), SessionState::Recording);
    assert!(!record.close);
}

#[test]
fn test_setup_before_announce_is_rejected() {
    let mut session = Session::new(peer(), None);
    let outcome = dispatch(request(Method::Setup, 3), &mut session);

    assert_status(&outcome, StatusCode::METHOD_NOT_VALID, "3");
    assert_eq!(response(&outcome).reason, "Method Not Valid in This State");
    assert_eq!(session.state(), SessionState::Connected);
    assert!(session.id().is_none());
    assert!(!outcome.close);
}

#[test]
fn test_record_before_setup_is_rejected() {
    let mut session = Session::new(peer(), None);
    dispatch(request(Method::Announce, 1), &mut session);

    let outcome = dispatch(request(Method::Record, 2), &mut session);
    assert_status(&outcome, StatusCode::METHOD_NOT_VALID, "2");
    assert!(outcome.notification.is_none());
    assert_eq!(session.state(), SessionState::Announced);
}

#[test]
fn test_second_setup_is_rejected_and_keeps_id() {
    let mut session = set_up_session();
    let id = session.id().unwrap().to_string();

    let outcome = dispatch(request(Method::Setup, 3), &mut session);
    assert_status(&outcome, StatusCode::METHOD_NOT_VALID, "3");
    assert_eq!(response(&outcome).session(), Some(id.as_str()));
    assert_eq!(session.id(), Some(id.as_str()));
}

#[test]
fn test_repeated_announce_allowed_before_setup() {
    let mut session = Session::new(peer(), None);
    dispatch(request(Method::Announce, 1), &mut session);
    let again = dispatch(request(Method::Announce, 2), &mut session);
    assert_status(&again, StatusCode::OK, "2");

    let mut session = set_up_session();
    let late = dispatch(request(Method::Announce, 3), &mut session);
    assert_status(&late, StatusCode::METHOD_NOT_VALID, "3");
}

#[test]
fn test_pause_and_flush_only_while_recording() {
    let mut session = set_up_session();

    let early = dispatch(request(Method::Pause, 3), &mut session);
    assert_status(&early, StatusCode::METHOD_NOT_VALID, "3");
    assert!(early.notification.is_none());

    dispatch(request(Method::Record, 4), &mut session);
    let pause = dispatch(request(Method::Pause, 5), &mut session);
    assert_status(&pause, StatusCode::OK, "5");
    assert_eq!(pause.notification, Some(Notification::Pause));

    let flush = dispatch(request(Method::Flush, 6), &mut session);
    assert_eq!(flush.notification, Some(Notification::Flush));
    assert_eq!(session.state(), SessionState::Recording);
}

#[test]
fn test_teardown_closes() {
    let mut session = set_up_session();
    dispatch(request(Method::Record, 3), &mut session);

    let outcome = dispatch(request(Method::Teardown, 4), &mut session);
    assert_status(&outcome, StatusCode::OK, "4");
    assert_eq!(outcome.notification, Some(Notification::Stop));
    assert!(outcome.close);
    assert_eq!(session.state(), SessionState::TornDown);
}

#[test]
fn test_teardown_from_connected() {
    let mut session = Session::new(peer(), None);
    let outcome = dispatch(request(Method::Teardown, 1), &mut session);
    assert_status(&outcome, StatusCode::OK, "1");
    assert!(outcome.close);
    assert!(outcome.notification.is_none());
}

#[test]
fn test_set_parameter_volume() {
    let mut session = set_up_session();
    let decoded = Decoded::Request(
        Request::builder(Method::SetParameter, "rtsp://10.0.0.1/1")
            .cseq(10)
            .body("volume: -20.000000\r\n", "text/parameters")
            .build(),
    );

    let outcome = dispatch(decoded, &mut session);
    assert_status(&outcome, StatusCode::OK, "10");
    match outcome.notification {
        Some(Notification::Volume(linear)) => assert!((linear - 0.1).abs() < 1e-4),
        other => panic!("expected volume notification, got {other:?}"),
    }
}

#[test]
fn test_set_parameter_without_volume_or_before_setup() {
    let mut session = set_up_session();
    let other = Decoded::Request(
        Request::builder(Method::SetParameter, "*")
            .cseq(4)
            .body("progress: 1/2/3\r\n", "text/parameters")
            .build(),
    );
    let outcome = dispatch(other, &mut session);
    assert_status(&outcome, StatusCode::OK, "4");
    assert!(outcome.notification.is_none());

    let mut fresh = Session::new(peer(), None);
    let outcome = dispatch(request(Method::SetParameter, 1), &mut fresh);
    assert_status(&outcome, StatusCode::METHOD_NOT_VALID, "1");
}

#[test]
fn test_streaming_without_cseq_is_bad_request() {
    let mut session = Session::new(peer(), None);
    let decoded = Decoded::Request(Request::new(Method::Announce, "*"));

    let outcome = dispatch(decoded, &mut session);
    let resp = response(&outcome);
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(resp.cseq().is_none());
    assert_eq!(session.state(), SessionState::Connected);
}

#[test]
fn test_wide_cseq_is_echoed_verbatim() {
    let mut session = Session::new(peer(), None);
    for cseq in ["4294967296", "18446744073709551616", "007"] {
        let decoded = Decoded::Request(
            Request::builder(Method::Announce, "*")
                .header(names::CSEQ, cseq)
                .build(),
        );
        let outcome = dispatch(decoded, &mut Session::new(peer(), None));
        assert_status(&outcome, StatusCode::OK, cseq);
    }

    for cseq in ["+5", "-1", "12a"] {
        let decoded = Decoded::Request(
            Request::builder(Method::Announce, "*")
                .header(names::CSEQ, cseq)
                .build(),
        );
        let outcome = dispatch(decoded, &mut session);
        assert_eq!(response(&outcome).status, StatusCode::BAD_REQUEST);
    }
    assert_eq!(session.state(), SessionState::Connected);
}

#[test]
fn test_streaming_with_non_numeric_cseq_echoes_it() {
    let mut session = Session::new(peer(), None);
    let decoded = Decoded::Request(
        Request::builder(Method::Announce, "*")
            .header(names::CSEQ, "seven")
            .build(),
    );

    let outcome = dispatch(decoded, &mut session);
    let resp = response(&outcome);
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.cseq(), Some("seven"));
    assert_eq!(session.state(), SessionState::Connected);
}

#[test]
fn test_discovery_response() {
    let mut session = Session::new(peer(), None);
    let decoded = Decoded::Request(
        Request::builder(Method::Get, "/info")
            .version(HTTP_VERSION)
            .build(),
    );

    let outcome = dispatch(decoded, &mut session);
    let resp = response(&outcome);
    assert_eq!(resp.version, HTTP_VERSION);
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(
        resp.headers.get(names::CONTENT_TYPE),
        Some(CAPABILITY_CONTENT_TYPE)
    );
    assert_eq!(resp.headers.get(names::CONTENT_LENGTH), Some("0"));
    assert!(resp.body.is_empty());
    assert!(resp.cseq().is_none());
    assert_eq!(session.state(), SessionState::Connected);
}

#[test]
fn test_discovery_echoes_cseq_when_present() {
    let mut session = Session::new(peer(), None);
    let outcome = dispatch(request(Method::Options, 42), &mut session);
    assert_eq!(response(&outcome).cseq(), Some("42"));
    assert_eq!(response(&outcome).version, HTTP_VERSION);
}

#[test]
fn test_unrecognized_is_silent() {
    let mut session = Session::new(peer(), None);
    let outcome = dispatch(
        Decoded::Unrecognized {
            token: "GET_PARAMETER".into(),
        },
        &mut session,
    );
    assert!(outcome.response.is_none());
    assert!(outcome.notification.is_none());
    assert!(!outcome.close);
}

fn pairing_key() -> Arc<PairingKey> {
    Arc::new(PairingKey::from_bytes(b"0123456789abcdef".to_vec()).unwrap())
}

fn paired_setup(cseq: u32, answer: Option<&str>) -> Decoded {
    let mut builder = Request::builder(Method::Setup, "rtsp://10.0.0.1/1").cseq(cseq);
    if let Some(answer) = answer {
        builder = builder.header(names::PAIRING_RESPONSE, answer);
    }
    Decoded::Request(builder.build())
}

fn challenge_of(outcome: &Outcome) -> Vec<u8> {
    let encoded = response(outcome)
        .headers
        .get(names::PAIRING_CHALLENGE)
        .expect("challenge header");
    base64_decode(encoded).unwrap()
}

#[test]
fn test_pairing_challenge_then_accept() {
    let key = pairing_key();
    let mut session = Session::new(peer(), Some(PairingGate::new(Arc::clone(&key))));
    dispatch(request(Method::Announce, 1), &mut session);

    let first = dispatch(paired_setup(2, None), &mut session);
    assert_status(&first, StatusCode::UNAUTHORIZED, "2");
    assert_eq!(session.state(), SessionState::Announced);

    let challenge = challenge_of(&first);
    let answer = base64_encode(&hmac_sha1(key.as_bytes(), &challenge).unwrap());
    let second = dispatch(paired_setup(3, Some(&answer)), &mut session);
    assert_status(&second, StatusCode::OK, "3");
    assert!(session.is_authenticated());
    assert!(session.session_key().is_some());
    assert_eq!(session.state(), SessionState::Setup);
}

#[test]
fn test_pairing_wrong_answer_reissues_then_locks_out() {
    let mut session = Session::new(peer(), Some(PairingGate::new(pairing_key())));
    dispatch(request(Method::Announce, 1), &mut session);

    let mut outcome = dispatch(paired_setup(2, None), &mut session);
    let mut previous = challenge_of(&outcome);

    for cseq in 3..5 {
        outcome = dispatch(paired_setup(cseq, Some("AAAA")), &mut session);
        assert_status(&outcome, StatusCode::UNAUTHORIZED, &cseq.to_string());
        let next = challenge_of(&outcome);
        assert_ne!(next, previous);
        previous = next;
        assert!(!outcome.close);
    }

    let locked = dispatch(paired_setup(5, Some("AAAA")), &mut session);
    assert_status(&locked, StatusCode::FORBIDDEN, "5");
    assert!(locked.close);
    assert_eq!(session.state(), SessionState::Announced);
}

#[test]
fn test_pairing_undecodable_answer_counts_as_failure() {
    let mut session = Session::new(peer(), Some(PairingGate::new(pairing_key())));
    dispatch(request(Method::Announce, 1), &mut session);
    dispatch(paired_setup(2, None), &mut session);

    let outcome = dispatch(paired_setup(3, Some("!!not base64!!")), &mut session);
    assert_status(&outcome, StatusCode::UNAUTHORIZED, "3");
    assert_eq!(session.pairing_mut().unwrap().failures(), 1);
}

proptest! {
    #[test]
    fn streaming_responses_echo_cseq(cseq in any::<u32>(), method_index in 0usize..7) {
        let method = [
            Method::Announce,
            Method::Setup,
            Method::Record,
            Method::Pause,
            Method::Flush,
            Method::Teardown,
            Method::SetParameter,
        ][method_index];

        let mut session = Session::new(peer(), None);
        let outcome = dispatch(request(method, cseq), &mut session);
        let resp = outcome.response.expect("streaming requests are answered");
        let expected = cseq.to_string();
        prop_assert_eq!(resp.cseq(), Some(expected.as_str()));
    }
}
