use std::sync::{Arc, Mutex};

use jid::Jid;
use minidom::Element;
use plover_test_support::fakes::{Call, RecordingCollaborators};
use plover_test_support::fixtures;
use plover_xmpp::{
    Account, AttemptId, AuthAttempt, Delivery, EngineOptions, EventOutcome, SessionEngine,
    SessionError, SessionEvent, SessionState,
};

fn engine(recorder: &RecordingCollaborators) -> SessionEngine {
    SessionEngine::new(recorder.collaborators(), EngineOptions::default())
}

fn outbound(id: &str) -> Element {
    Element::builder("message", "jabber:client")
        .attr("id", id)
        .attr("to", "bob@example.com")
        .build()
}

fn assert_identity_matches_state(engine: &SessionEngine) {
    let holds_user = matches!(
        engine.state(),
        SessionState::LoggedIn | SessionState::Ready | SessionState::LoggingOut
    );
    assert_eq!(
        engine.is_logged_in(),
        holds_user,
        "current user presence disagrees with state {}",
        engine.state()
    );
}

/// Walks the whole handshake, answering each collaborator call the way a
/// server would. Returns the bound address.
fn complete_login(engine: &mut SessionEngine, recorder: &RecordingCollaborators) -> Jid {
    engine
        .login("alice@example.com".parse().unwrap(), Some("secret".into()))
        .expect("login accepted");
    assert_identity_matches_state(engine);

    let features = fixtures::stanza_element("stream-features-mechanisms.xml");
    engine.handle(SessionEvent::StanzaReceived(features)).unwrap();

    let attempt = recorder
        .last_authorization_request()
        .expect("authorization requested");
    engine
        .handle(SessionEvent::auth_succeeded(&attempt))
        .unwrap();
    assert_identity_matches_state(engine);

    let (bound_for, resource) = recorder.last_bind_request().expect("bind requested");
    assert_eq!(bound_for, attempt.id);
    let resource = resource.expect("named login binds its resource");
    let address: Jid = format!("alice@example.com/{resource}").parse().unwrap();
    engine
        .handle(SessionEvent::resource_bound(attempt.id, address.clone()))
        .unwrap();
    assert_eq!(
        recorder.count(|call| matches!(call, Call::RequestSession(..))),
        1
    );

    engine
        .handle(SessionEvent::session_established(attempt.id, address.clone()))
        .unwrap();
    assert_identity_matches_state(engine);
    address
}

// ── Login ───────────────────────────────────────────────────────────

#[test]
fn full_login_reaches_logged_in_in_order() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    engine
        .observers_mut()
        .on_state_changed(move |state| sink.lock().unwrap().push(state));

    let address = complete_login(&mut engine, &recorder);

    assert_eq!(engine.state(), SessionState::LoggedIn);
    assert_eq!(engine.current_user(), Some(&address));
    assert_eq!(
        *states.lock().unwrap(),
        vec![
            SessionState::Connecting,
            SessionState::Authorized,
            SessionState::LoggedIn
        ]
    );
    let calls = recorder.calls();
    assert_eq!(calls[0], Call::Connect);
    assert!(matches!(calls[1], Call::AuthorizationRequest(_)));
    assert_eq!(calls[2], Call::RestartStream);
    assert!(matches!(calls[3], Call::BindResource(_, Some(_))));
    assert!(matches!(&calls[4], Call::RequestSession(_, bound) if *bound == address));
}

#[test]
fn explicit_resource_is_kept() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);

    engine
        .login("alice@example.com/laptop".parse().unwrap(), None)
        .unwrap();
    engine
        .handle(SessionEvent::StanzaReceived(fixtures::stanza_element(
            "stream-features-mechanisms.xml",
        )))
        .unwrap();

    let attempt = recorder.last_authorization_request().unwrap();
    assert_eq!(attempt.account.resource().as_deref(), Some("laptop"));
}

#[test]
fn anonymous_login_binds_server_assigned_resource() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);

    engine.login(Account::anonymous("example.com"), None).unwrap();
    engine
        .handle(SessionEvent::StanzaReceived(fixtures::stanza_element(
            "stream-features-mechanisms.xml",
        )))
        .unwrap();
    let attempt = recorder.last_authorization_request().unwrap();
    assert!(attempt.account.is_anonymous());
    engine
        .handle(SessionEvent::auth_succeeded(&attempt))
        .unwrap();

    assert_eq!(
        recorder.last_bind_request(),
        Some((attempt.id, None::<String>))
    );
}

#[test]
fn anonymous_login_with_password_leaves_everything_untouched() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);

    let error = engine
        .login(Account::anonymous("example.com"), Some("secret".into()))
        .unwrap_err();

    assert!(matches!(error, SessionError::InvalidLoginArgument(_)));
    assert_eq!(engine.state(), SessionState::Disconnected);
    assert!(recorder.calls().is_empty());
}

#[test]
fn login_while_logged_in_is_rejected() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);
    complete_login(&mut engine, &recorder);

    let error = engine
        .login("alice@example.com".parse().unwrap(), None)
        .unwrap_err();

    assert_eq!(error, SessionError::LoginInProgress(SessionState::LoggedIn));
    assert_eq!(engine.state(), SessionState::LoggedIn);
}

#[test]
fn features_without_pending_attempt_change_nothing() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);

    let outcome = engine
        .handle(SessionEvent::StanzaReceived(fixtures::stanza_element(
            "stream-features-mechanisms.xml",
        )))
        .unwrap();

    assert_eq!(outcome, EventOutcome::Ignored);
    assert_eq!(engine.state(), SessionState::Disconnected);
    assert!(recorder.calls().is_empty());
}

#[test]
fn features_without_mechanisms_do_not_consume_attempt() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);
    engine
        .login("alice@example.com".parse().unwrap(), None)
        .unwrap();

    engine
        .handle(SessionEvent::StanzaReceived(fixtures::stanza_element(
            "stream-features-bind.xml",
        )))
        .unwrap();

    assert!(recorder.last_authorization_request().is_none());
    assert!(engine.is_authorizing());
}

// ── Outbound queue ──────────────────────────────────────────────────

#[test]
fn queued_stanzas_reach_connection_in_order_once_ready() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);

    assert_eq!(engine.send(outbound("a")).unwrap(), Delivery::Queued);
    assert_eq!(engine.send(outbound("b")).unwrap(), Delivery::Queued);
    let address = complete_login(&mut engine, &recorder);
    assert!(recorder.sent().is_empty());

    assert!(engine.set_ready());

    let sent = recorder.sent();
    let ids: Vec<_> = sent.iter().filter_map(|stanza| stanza.attr("id")).collect();
    assert_eq!(ids, vec!["a", "b"]);
    let from = address.to_string();
    assert!(sent.iter().all(|stanza| stanza.attr("from") == Some(from.as_str())));
    assert_eq!(engine.queued_len(), 0);
    assert_eq!(engine.state(), SessionState::Ready);
    assert_identity_matches_state(&engine);
}

#[test]
fn ready_listener_sees_connection_already_flushed() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);
    engine.send(outbound("a")).unwrap();
    complete_login(&mut engine, &recorder);

    let seen = Arc::new(Mutex::new(None));
    let connection = recorder.clone();
    let sink = Arc::clone(&seen);
    engine.observers_mut().on_state_changed(move |state| {
        if state == SessionState::Ready {
            *sink.lock().unwrap() = Some(connection.sent().len());
        }
    });
    engine.set_ready();

    assert_eq!(*seen.lock().unwrap(), Some(1));
}

#[test]
fn logged_in_sends_immediately_with_from_stamped() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);
    let address = complete_login(&mut engine, &recorder);

    assert_eq!(engine.send(outbound("now")).unwrap(), Delivery::Sent);

    let sent = recorder.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].attr("from"), Some(address.to_string().as_str()));
}

#[test]
fn set_ready_again_re_emits_ready() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);
    complete_login(&mut engine, &recorder);
    assert!(engine.set_ready());
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    engine
        .observers_mut()
        .on_state_changed(move |state| sink.lock().unwrap().push(state));

    assert!(engine.set_ready());

    assert_eq!(engine.state(), SessionState::Ready);
    assert_eq!(*states.lock().unwrap(), vec![SessionState::Ready]);
    assert_identity_matches_state(&engine);
}

#[test]
fn set_ready_before_login_is_ignored() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);
    engine.send(outbound("a")).unwrap();

    assert!(!engine.set_ready());
    assert_eq!(engine.state(), SessionState::Disconnected);
    assert_eq!(engine.queued_len(), 1);
}

// ── Handshake identity ──────────────────────────────────────────────

/// Drives a named login up to `Authorized` and returns the attempt the
/// authenticator was handed.
fn authorize(engine: &mut SessionEngine, recorder: &RecordingCollaborators) -> AuthAttempt {
    engine
        .login("alice@example.com".parse().unwrap(), Some("secret".into()))
        .unwrap();
    engine
        .handle(SessionEvent::StanzaReceived(fixtures::stanza_element(
            "stream-features-mechanisms.xml",
        )))
        .unwrap();
    let attempt = recorder.last_authorization_request().unwrap();
    engine
        .handle(SessionEvent::auth_succeeded(&attempt))
        .unwrap();
    assert_eq!(engine.state(), SessionState::Authorized);
    attempt
}

#[test]
fn session_result_for_foreign_address_does_not_log_in() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);
    let attempt = authorize(&mut engine, &recorder);
    let stranger: Jid = "mallory@evil.example/x".parse().unwrap();

    let outcome = engine
        .handle(SessionEvent::session_established(attempt.id, stranger))
        .unwrap();

    assert_eq!(outcome, EventOutcome::Ignored);
    assert_eq!(engine.state(), SessionState::Authorized);
    assert!(engine.current_user().is_none());
    assert_identity_matches_state(&engine);
}

#[test]
fn bind_result_for_foreign_address_requests_no_session() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);
    let attempt = authorize(&mut engine, &recorder);
    let stranger: Jid = "mallory@evil.example/x".parse().unwrap();

    let outcome = engine
        .handle(SessionEvent::resource_bound(attempt.id, stranger))
        .unwrap();

    assert_eq!(outcome, EventOutcome::Ignored);
    assert_eq!(
        recorder.count(|call| matches!(call, Call::RequestSession(..))),
        0
    );
}

#[test]
fn results_tagged_with_another_attempt_are_ignored() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);
    let attempt = authorize(&mut engine, &recorder);
    let other = AttemptId::default();
    assert_ne!(other, attempt.id);
    let address: Jid = "alice@example.com/laptop".parse().unwrap();

    let bound = engine
        .handle(SessionEvent::resource_bound(other, address.clone()))
        .unwrap();
    let established = engine
        .handle(SessionEvent::session_established(other, address.clone()))
        .unwrap();

    assert_eq!(bound, EventOutcome::Ignored);
    assert_eq!(established, EventOutcome::Ignored);
    assert!(engine.current_user().is_none());

    engine
        .handle(SessionEvent::session_established(attempt.id, address.clone()))
        .unwrap();
    assert_eq!(engine.current_user(), Some(&address));
    assert_eq!(engine.state(), SessionState::LoggedIn);
}

#[test]
fn anonymous_session_accepts_any_local_part_on_its_domain() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);
    engine.login(Account::anonymous("example.com"), None).unwrap();
    engine
        .handle(SessionEvent::StanzaReceived(fixtures::stanza_element(
            "stream-features-mechanisms.xml",
        )))
        .unwrap();
    let attempt = recorder.last_authorization_request().unwrap();
    engine
        .handle(SessionEvent::auth_succeeded(&attempt))
        .unwrap();

    let elsewhere: Jid = "guest@evil.example/x".parse().unwrap();
    assert_eq!(
        engine
            .handle(SessionEvent::session_established(attempt.id, elsewhere))
            .unwrap(),
        EventOutcome::Ignored
    );

    let assigned: Jid = "3f9a2c@example.com/r1".parse().unwrap();
    engine
        .handle(SessionEvent::session_established(attempt.id, assigned.clone()))
        .unwrap();
    assert_eq!(engine.current_user(), Some(&assigned));
}

// ── Requests ────────────────────────────────────────────────────────

#[test]
fn request_callback_fires_once_on_matching_response() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);
    complete_login(&mut engine, &recorder);
    engine.set_ready();

    let hits = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&hits);
    let request = Element::builder("iq", "jabber:client")
        .attr("type", "get")
        .build();
    let id = engine
        .send_request("roster", request, move |_| *counter.lock().unwrap() += 1)
        .unwrap();

    let unrelated = fixtures::stanza_element("iq-roster-result.xml");
    let mut response = unrelated.clone();
    response.set_attr("id", id.as_str());

    engine
        .handle(SessionEvent::StanzaReceived(unrelated))
        .unwrap();
    assert_eq!(*hits.lock().unwrap(), 0);

    engine
        .handle(SessionEvent::StanzaReceived(response.clone()))
        .unwrap();
    let replay = engine
        .handle(SessionEvent::StanzaReceived(response))
        .unwrap();

    assert_eq!(*hits.lock().unwrap(), 1);
    assert_eq!(replay, EventOutcome::Ignored);
    assert_eq!(engine.pending_requests(), 0);
}

#[test]
fn requests_sent_before_login_carry_id_in_queue() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);
    let request = Element::builder("iq", "jabber:client")
        .attr("type", "get")
        .build();

    let id = engine.send_request("disco", request, |_| {}).unwrap();
    complete_login(&mut engine, &recorder);
    engine.set_ready();

    assert_eq!(recorder.sent()[0].attr("id"), Some(id.as_str()));
}

// ── Routing ─────────────────────────────────────────────────────────

#[test]
fn inbound_stanzas_reach_their_observers() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (messages, presences, requests) = (seen.clone(), seen.clone(), seen.clone());
    engine
        .observers_mut()
        .on_message(move |_| messages.lock().unwrap().push("message"));
    engine
        .observers_mut()
        .on_presence(move |_| presences.lock().unwrap().push("presence"));
    engine
        .observers_mut()
        .on_request(move |_| requests.lock().unwrap().push("request"));

    for name in [
        "message-chat.xml",
        "presence-available.xml",
        "iq-disco-get.xml",
    ] {
        engine
            .handle(SessionEvent::StanzaReceived(fixtures::stanza_element(name)))
            .unwrap();
    }
    let unknown = Element::builder("r", "urn:xmpp:sm:3").build();
    let outcome = engine.handle(SessionEvent::StanzaReceived(unknown)).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["message", "presence", "request"]);
    assert_eq!(outcome, EventOutcome::Ignored);
}

// ── Failures ────────────────────────────────────────────────────────

#[test]
fn transport_error_after_login_disconnects_and_clears_user() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);
    complete_login(&mut engine, &recorder);
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    engine
        .observers_mut()
        .on_state_changed(move |state| sink.lock().unwrap().push(state));

    engine
        .handle(SessionEvent::TransportError("connection reset".into()))
        .unwrap();

    assert_eq!(engine.state(), SessionState::Disconnected);
    assert!(engine.current_user().is_none());
    assert_eq!(
        *states.lock().unwrap(),
        vec![SessionState::Error, SessionState::Disconnected]
    );
    assert_eq!(recorder.count(|call| *call == Call::Disconnect), 1);
}

#[test]
fn results_after_transport_error_are_stale() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);
    engine
        .login("alice@example.com".parse().unwrap(), None)
        .unwrap();
    engine
        .handle(SessionEvent::StanzaReceived(fixtures::stanza_element(
            "stream-features-mechanisms.xml",
        )))
        .unwrap();
    let attempt = recorder.last_authorization_request().unwrap();
    engine
        .handle(SessionEvent::TransportError("eof".into()))
        .unwrap();

    let outcome = engine
        .handle(SessionEvent::auth_succeeded(&attempt))
        .unwrap();

    assert_eq!(outcome, EventOutcome::Ignored);
    assert_eq!(engine.state(), SessionState::Disconnected);
    assert_eq!(recorder.count(|call| *call == Call::RestartStream), 0);
}

#[test]
fn transport_error_keeps_queued_traffic_for_next_session() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);
    engine.send(outbound("kept")).unwrap();
    engine
        .login("alice@example.com".parse().unwrap(), None)
        .unwrap();
    engine
        .handle(SessionEvent::TransportError("eof".into()))
        .unwrap();

    assert_eq!(engine.queued_len(), 1);
    complete_login(&mut engine, &recorder);
    engine.set_ready();
    assert_eq!(recorder.sent()[0].attr("id"), Some("kept"));
}

// ── Logout ──────────────────────────────────────────────────────────

#[test]
fn logout_walks_through_logging_out() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);
    complete_login(&mut engine, &recorder);
    engine.set_ready();
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    engine
        .observers_mut()
        .on_state_changed(move |state| sink.lock().unwrap().push(state));

    assert!(engine.logout());

    assert_eq!(
        *states.lock().unwrap(),
        vec![SessionState::LoggingOut, SessionState::Disconnected]
    );
    assert!(!engine.is_logged_in());
    assert_eq!(recorder.count(|call| *call == Call::Disconnect), 1);
}

#[test]
fn logout_while_disconnected_is_a_no_op() {
    let recorder = RecordingCollaborators::new();
    let mut engine = engine(&recorder);

    assert!(!engine.logout());

    assert_eq!(engine.state(), SessionState::Disconnected);
    assert!(recorder.calls().is_empty());
}

// ── Pause / resume ──────────────────────────────────────────────────

#[test]
fn pause_then_resume_flushes_queue() {
    let token = plover_xmpp::ResumptionToken::new(b"sm-42".to_vec());
    let recorder = RecordingCollaborators::new().with_resumption_token(token.clone());
    let mut engine = engine(&recorder);
    let address = complete_login(&mut engine, &recorder);
    engine.set_ready();

    assert_eq!(engine.pause(), Some(token.clone()));
    assert_eq!(engine.state(), SessionState::Ready);

    engine
        .handle(SessionEvent::TransportError("suspended".into()))
        .unwrap();
    engine.send(outbound("while-away")).unwrap();
    recorder.clear();

    engine.resume(address.clone(), token.clone());

    let calls = recorder.calls();
    assert_eq!(calls[0], Call::Resume(token));
    assert!(matches!(&calls[1], Call::Send(stanza) if stanza.attr("id") == Some("while-away")));
    assert_eq!(engine.state(), SessionState::Ready);
    assert_eq!(engine.current_user(), Some(&address));
}
