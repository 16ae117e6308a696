// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Mutex;

use tokio::io::DuplexStream;
use tokio_jabber::error::{ConnectError, NegotiationError};
use tokio_jabber::negotiation::TlsPolicy;
use tokio_jabber::{ns, Connection, TlsState};

use super::*;
use crate::event::Payload;

const SERVER_HEADER: &str = "<?xml version='1.0'?><stream:stream xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams' id='s1' from='example.org' version='1.0'>";
const PLAIN_FEATURES: &str = "<stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>PLAIN</mechanism></mechanisms></stream:features>";
const BIND_FEATURES: &str = "<stream:features><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/></stream:features>";

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone)]
struct DuplexConnector {
    slot: Arc<Mutex<Option<DuplexStream>>>,
}

impl ServerConnector for DuplexConnector {
    async fn connect(&self) -> Result<tokio_jabber::Connection, ConnectError> {
        let stream = self.slot.lock().unwrap().take().ok_or(ConnectError::Timeout)?;
        Ok(Connection::new(Box::new(stream), TlsState::Plaintext))
    }
}

struct MockServer {
    stream: XmlStream,
}

impl MockServer {
    async fn open(&mut self, features: &str) {
        self.stream.recv_header().await.unwrap();
        self.stream.send_raw(SERVER_HEADER).await.unwrap();
        self.stream.send_raw(features).await.unwrap();
    }

    async fn expect(&mut self, name: &str) -> Element {
        let element = self.stream.next().await.unwrap().unwrap();
        assert_eq!(element.name(), name);
        element
    }

    async fn send(&mut self, xml: &str) {
        self.stream.send_raw(xml).await.unwrap();
    }

    async fn login(&mut self) {
        self.open(PLAIN_FEATURES).await;
        self.expect("auth").await;
        self.send("<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>")
            .await;
        self.stream.reset();
        self.open(BIND_FEATURES).await;
        self.expect("iq").await;
        self.send("<iq type='result' id='resource-bind'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'><jid>bot@example.org/res</jid></bind></iq>")
            .await;
    }

    async fn expect_closed(&mut self) {
        assert!(matches!(
            self.stream.next().await,
            Some(Err(IoError::Closed))
        ));
    }
}

fn setup() -> (Session<DuplexConnector>, MockServer) {
    setup_debug(false)
}

fn setup_debug(debug: bool) -> (Session<DuplexConnector>, MockServer) {
    let (client, server) = tokio::io::duplex(65536);
    let config = Config::builder("example.org", "bot", "pencil")
        .resource("res")
        .tls(TlsPolicy::Disabled)
        .mechanisms(["PLAIN"])
        .debug(debug)
        .build();
    let connector = DuplexConnector {
        slot: Arc::new(Mutex::new(Some(client))),
    };
    let server = Connection::new(Box::new(server), TlsState::Plaintext);
    (
        Session::with_connector(connector, config),
        MockServer {
            stream: XmlStream::new(server, ns::JABBER_CLIENT),
        },
    )
}

fn record(session: &mut Session<DuplexConnector>, log: &Log, names: &[EventName]) {
    for name in names {
        let log = log.clone();
        session.set_handler(*name, move |event, _| {
            log.lock().unwrap().push(event.name().to_string());
            Ok(())
        });
    }
}

fn login_on_connect(session: &mut Session<DuplexConnector>) {
    session.set_handler(EventName::Connected, |_, actions| {
        actions.login();
        Ok(())
    });
}

const LIFECYCLE: &[EventName] = &[
    EventName::Connected,
    EventName::Authenticated,
    EventName::AuthFailure,
    EventName::Disconnected,
    EventName::Terminated,
];

#[tokio::test]
async fn test_login_sets_presence() {
    let (mut session, mut server) = setup();
    let log = Log::default();
    record(&mut session, &log, LIFECYCLE);
    login_on_connect(&mut session);
    session.set_handler(EventName::Authenticated, |_, actions| {
        actions.set_presence("", "At your Service");
        Ok(())
    });

    let server = tokio::spawn(async move {
        server.login().await;
        let presence = server.expect("presence").await;
        let status = presence.get_child("status", ns::JABBER_CLIENT).unwrap();
        assert_eq!(status.text(), "At your Service");
        server
    });

    session.connect().await.unwrap();
    assert_eq!(session.state(), SessionState::Authenticated);
    assert_eq!(
        session.bound_jid().map(Jid::to_string).as_deref(),
        Some("bot@example.org/res")
    );
    assert_eq!(*log.lock().unwrap(), vec!["connected", "authenticated"]);

    let mut server = server.await.unwrap();
    session.disconnect().await;
    session.disconnect().await;
    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(session.bound_jid(), None);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["connected", "authenticated", "disconnected", "terminated"]
    );
    server.expect_closed().await;
}

#[tokio::test]
async fn test_auth_failure_terminates() {
    let (mut session, mut server) = setup();
    let log = Log::default();
    record(&mut session, &log, LIFECYCLE);
    login_on_connect(&mut session);
    let kinds = log.clone();
    session.set_handler(EventName::AuthFailure, move |event, _| {
        let info = event.error().unwrap();
        kinds.lock().unwrap().push(format!("{:?}", info.kind));
        let source = info.source.as_ref().unwrap();
        match source.downcast_ref::<NegotiationError>() {
            Some(NegotiationError::AuthRejected { condition, .. }) => {
                kinds.lock().unwrap().push(condition.clone())
            }
            other => panic!("unexpected source: {:?}", other),
        }
        Ok(())
    });

    let server = tokio::spawn(async move {
        server.open(PLAIN_FEATURES).await;
        server.expect("auth").await;
        server
            .send("<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><not-authorized/></failure>")
            .await;
        // No bind request follows.
        assert!(!matches!(server.stream.next().await, Some(Ok(_))));
    });

    match session.connect().await {
        Err(Error::Login(e)) => match &*e {
            NegotiationError::AuthRejected { condition, .. } => {
                assert_eq!(condition, "not-authorized")
            }
            other => panic!("unexpected login failure: {:?}", other),
        },
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "connected",
            "authfailure",
            "AuthRejected",
            "not-authorized",
            "disconnected",
            "terminated"
        ]
    );
    server.await.unwrap();
}

#[tokio::test]
async fn test_connect_failure_is_returned() {
    let (mut session, _server) = setup();
    session.connector.slot.lock().unwrap().take();
    let log = Log::default();
    record(&mut session, &log, LIFECYCLE);

    assert!(matches!(
        session.connect().await,
        Err(Error::Jabber(tokio_jabber::Error::Connect(
            ConnectError::Timeout
        )))
    ));
    assert_eq!(session.state(), SessionState::Terminated);
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_message_handlers_run_in_order() {
    let (mut session, mut server) = setup();
    login_on_connect(&mut session);
    let log = Log::default();
    for tag in ["first", "second"] {
        let log = log.clone();
        session.set_handler(EventName::MessageChat, move |event, _| {
            let body = event.message().unwrap().body.clone().unwrap_or_default();
            log.lock().unwrap().push(format!("{}:{}", tag, body));
            Ok(())
        });
    }
    record(&mut session, &log, &[EventName::Disconnected, EventName::Terminated]);

    let server = tokio::spawn(async move {
        server.login().await;
        server
            .send("<message type='chat' from='alice@example.org/phone'><body>hi</body></message>")
            .await;
        server.send("</stream:stream>").await;
        server
    });

    session.connect().await.unwrap();
    session
        .execute(Duration::from_secs(60), RunFor::Unbounded)
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["first:hi", "second:hi", "disconnected", "terminated"]
    );
    drop(server.await.unwrap());
}

#[tokio::test]
async fn test_failing_handler_does_not_stop_dispatch() {
    let (mut session, mut server) = setup();
    login_on_connect(&mut session);
    let log = Log::default();
    let bodies = log.clone();
    session.set_handler(EventName::MessageChat, move |event, _| {
        let body = event.message().unwrap().body.clone().unwrap_or_default();
        if body == "one" {
            return Err("cannot handle one".into());
        }
        bodies.lock().unwrap().push(body);
        Ok(())
    });
    let errors = log.clone();
    session.set_handler(EventName::Error, move |event, _| {
        let info = event.error().unwrap();
        assert_eq!(info.event, Some(EventName::MessageChat));
        errors.lock().unwrap().push(info.message.clone());
        Ok(())
    });

    let server = tokio::spawn(async move {
        server.login().await;
        for body in ["one", "two"] {
            server
                .send(&format!(
                    "<message type='chat' from='alice@example.org/phone'><body>{}</body></message>",
                    body
                ))
                .await;
        }
        server.send("</stream:stream>").await;
        server
    });

    session.connect().await.unwrap();
    session
        .execute(Duration::from_secs(60), RunFor::Unbounded)
        .await
        .unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["cannot handle one", "two"]);
    drop(server.await.unwrap());
}

#[tokio::test]
async fn test_execute_zero_duration_returns_immediately() {
    let (mut session, _server) = setup();
    let log = Log::default();
    record(&mut session, &log, &[EventName::Heartbeat]);
    session
        .execute(Duration::from_secs(1), RunFor::For(Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(log.lock().unwrap().is_empty());

    assert!(matches!(
        session
            .execute(Duration::from_secs(1), RunFor::Unbounded)
            .await,
        Err(Error::InvalidState {
            state: SessionState::Disconnected,
            ..
        })
    ));
}

#[tokio::test]
async fn test_operations_need_login() {
    let (mut session, _server) = setup();
    let to: Jid = "alice@example.org".parse().unwrap();
    assert!(matches!(
        session.send_message(&to, "chat", "hi").await,
        Err(Error::InvalidState {
            state: SessionState::Disconnected,
            ..
        })
    ));
    assert!(matches!(
        session.login().await,
        Err(Error::InvalidState { .. })
    ));
    assert!(session.request_roster().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_until_handler_disconnects() {
    let (mut session, mut server) = setup();
    login_on_connect(&mut session);
    let beats = Arc::new(Mutex::new(0));
    let counter = beats.clone();
    session.set_handler(EventName::Heartbeat, move |_, actions| {
        let mut beats = counter.lock().unwrap();
        *beats += 1;
        if *beats == 3 {
            actions.disconnect();
        }
        Ok(())
    });

    let server = tokio::spawn(async move {
        server.login().await;
        server.expect_closed().await;
    });

    session.connect().await.unwrap();
    session
        .execute(Duration::from_secs(1), RunFor::Unbounded)
        .await
        .unwrap();
    assert_eq!(*beats.lock().unwrap(), 3);
    assert_eq!(session.state(), SessionState::Terminated);
    server.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_run_for_deadline() {
    let (mut session, mut server) = setup();
    login_on_connect(&mut session);
    let log = Log::default();
    record(&mut session, &log, &[EventName::Heartbeat]);

    let server = tokio::spawn(async move {
        server.login().await;
        server.expect_closed().await;
    });

    session.connect().await.unwrap();
    session
        .execute(
            Duration::from_secs(1),
            RunFor::For(Duration::from_millis(2500)),
        )
        .await
        .unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["heartbeat", "heartbeat"]);
    assert_eq!(session.state(), SessionState::Authenticated);

    session.disconnect().await;
    server.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_handle() {
    let (mut session, mut server) = setup();
    login_on_connect(&mut session);
    let log = Log::default();
    record(
        &mut session,
        &log,
        &[EventName::Heartbeat, EventName::Terminated],
    );

    let server = tokio::spawn(async move {
        server.login().await;
        server.expect_closed().await;
    });

    session.connect().await.unwrap();
    let handle = session.disconnect_handle();
    tokio::spawn(async move {
        time::sleep(Duration::from_millis(1500)).await;
        handle.disconnect();
    });
    session
        .execute(Duration::from_secs(1), RunFor::Unbounded)
        .await
        .unwrap();
    assert!(!session.disconnect_handle().is_requested());
    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(*log.lock().unwrap(), vec!["heartbeat", "terminated"]);
    server.await.unwrap();
}

#[tokio::test]
async fn test_roster_request_is_tracked() {
    let (mut session, mut server) = setup();
    login_on_connect(&mut session);
    let log = Log::default();
    let contacts = log.clone();
    session.set_handler(EventName::RosterUpdate, move |event, _| {
        for item in event.roster().unwrap() {
            contacts.lock().unwrap().push(item.jid.to_string());
        }
        Ok(())
    });

    let server = tokio::spawn(async move {
        server.login().await;
        let iq = server.expect("iq").await;
        assert_eq!(iq.attr("type"), Some("get"));
        assert!(iq.get_child("query", ns::ROSTER).is_some());
        server
            .send(&format!(
                "<iq type='result' id='{}'><query xmlns='jabber:iq:roster'><item jid='alice@example.org' subscription='both'/><item jid='bob@example.org' subscription='to'/></query></iq>",
                iq.attr("id").unwrap()
            ))
            .await;
        server.send("</stream:stream>").await;
        server
    });

    session.connect().await.unwrap();
    session.request_roster().await.unwrap();
    assert_eq!(session.dispatcher().iq_tracker().pending(), 1);
    session
        .execute(Duration::from_secs(60), RunFor::Unbounded)
        .await
        .unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["alice@example.org", "bob@example.org"]
    );
    assert_eq!(session.dispatcher().iq_tracker().pending(), 0);
    drop(server.await.unwrap());
}

#[tokio::test]
async fn test_negotiation_reaches_debug_log() {
    let (mut session, mut server) = setup_debug(true);
    login_on_connect(&mut session);
    let lines = Log::default();
    let seen = lines.clone();
    session.set_handler(EventName::DebugLog, move |event, _| {
        if let Payload::Log { message, .. } = event.payload() {
            seen.lock().unwrap().push(message.clone());
        }
        Ok(())
    });

    let server = tokio::spawn(async move {
        server.login().await;
        server.expect("presence").await;
        server
    });

    session.connect().await.unwrap();
    session.set_presence("", "").await.unwrap();
    let lines = lines.lock().unwrap();
    for expected in [
        "Selected SASL mechanism PLAIN",
        "Authenticated with PLAIN",
        "Bound to bot@example.org/res",
    ] {
        assert!(
            lines.iter().any(|line| line == expected),
            "{:?} missing from {:?}",
            expected,
            lines
        );
    }
    assert!(lines.iter().any(|line| line.starts_with("SEND: <presence")));
    drop(server.await.unwrap());
}

#[tokio::test]
async fn test_debug_log_is_silent_without_debug() {
    let (mut session, mut server) = setup();
    login_on_connect(&mut session);
    let lines = Log::default();
    record(&mut session, &lines, &[EventName::DebugLog]);

    let server = tokio::spawn(async move {
        server.login().await;
        server
    });

    session.connect().await.unwrap();
    assert_eq!(session.state(), SessionState::Authenticated);
    assert!(lines.lock().unwrap().is_empty());
    drop(server.await.unwrap());
}
