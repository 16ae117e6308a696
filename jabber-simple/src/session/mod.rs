// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The session façade and the event loop feeding the [`Dispatcher`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use log::Level;
use tokio::sync::Notify;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_jabber::connect::{ServerConnector, TcpServerConnector};
use tokio_jabber::error::IoError;
use tokio_jabber::logging::Logger;
use tokio_jabber::minidom::Element;
use tokio_jabber::negotiation::{Negotiator, OpenStream};
use tokio_jabber::stanza::make_id;
use tokio_jabber::xmlstream::XmlStream;
use tokio_jabber::{log_to, Jid, Stanza};

use crate::actions::{Action, Actions};
use crate::config::{Config, RunFor};
use crate::dispatcher::{Dispatcher, HandlerResult};
use crate::error::{Error, ErrorInfo, ErrorKind};
use crate::event::{Event, EventName};
use crate::iq::IqOutcome;
use crate::roster::{self, RosterItem};

#[cfg(test)]
mod tests;

/// Where a session is in its life.
///
/// States only move forward; [`Terminated`][SessionState::Terminated] is
/// reachable from every other state and final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Not connected yet.
    Disconnected,
    /// Opening the TCP connection.
    Connecting,
    /// Stream open, TLS done, waiting for or running SASL.
    Negotiating,
    /// Logged in, resource bound.
    Authenticated,
    /// Finished for good.
    Terminated,
}

#[derive(Debug, Default)]
struct Signal {
    requested: AtomicBool,
    notify: Notify,
}

/// Asks a running [`Session::execute`] to disconnect, from anywhere.
#[derive(Debug, Clone)]
pub struct DisconnectHandle {
    signal: Arc<Signal>,
}

impl DisconnectHandle {
    /// Request a disconnect. The session notices at its next wakeup.
    pub fn disconnect(&self) {
        self.signal.requested.store(true, Ordering::SeqCst);
        self.signal.notify.notify_one();
    }

    /// Whether a disconnect was requested and not yet carried out.
    pub fn is_requested(&self) -> bool {
        self.signal.requested.load(Ordering::SeqCst)
    }
}

enum Link {
    /// Stream open, waiting for login.
    Open(OpenStream),
    /// Logged in.
    Ready(XmlStream),
}

impl Link {
    fn stream_mut(&mut self) -> &mut XmlStream {
        match self {
            Link::Open(open) => open.stream_mut(),
            Link::Ready(stream) => stream,
        }
    }
}

enum Step {
    Wakeup,
    Deadline,
    Heartbeat,
    Received(Option<Result<Element, IoError>>),
}

/// Lines logged by the transport and the negotiation, waiting to be fired
/// as `debug_log` events.
type LogQueue = Arc<Mutex<VecDeque<(Level, String)>>>;

/// A logger for `config`. With `debug` set, every line is also queued for
/// `debug_log`.
fn session_logger(config: &Config) -> (Logger, Option<LogQueue>) {
    if !config.debug {
        return (Logger::default(), None);
    }
    let queue = LogQueue::default();
    let sink = queue.clone();
    let logger = Logger::new(Arc::new(move |level, line: &str| {
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back((level, line.to_owned()));
    }));
    (logger, Some(queue))
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => futures::future::pending().await,
    }
}

/// A client session.
///
/// Handlers registered with [`set_handler`][Session::set_handler] observe
/// everything the session does and queue follow-up work on the
/// [`Actions`] they are handed. The session carries that work out once the
/// handlers return, so handlers never run concurrently with I/O.
pub struct Session<C: ServerConnector = TcpServerConnector> {
    connector: C,
    config: Config,
    state: SessionState,
    dispatcher: Dispatcher,
    negotiator: Option<Negotiator>,
    link: Option<Link>,
    jid: Option<Jid>,
    pending: VecDeque<Action>,
    signal: Arc<Signal>,
    logger: Logger,
    log_queue: Option<LogQueue>,
}

impl<C: ServerConnector> core::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("connector", &self.connector)
            .field("server", &self.config.server)
            .field("state", &self.state)
            .field("jid", &self.jid)
            .field("dispatcher", &self.dispatcher)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Session<TcpServerConnector> {
    /// A session connecting over TCP as configured.
    pub fn new(config: Config) -> Session<TcpServerConnector> {
        let (logger, log_queue) = session_logger(&config);
        let connector = config.connector().with_logger(logger.clone());
        Session::build(connector, config, logger, log_queue)
    }
}

impl<C: ServerConnector> Session<C> {
    /// A session using a custom connector.
    ///
    /// With `debug` set, lines logged once the stream is open reach
    /// `debug_log`; the connector's own lines only do if it was set up
    /// with the session's logger.
    pub fn with_connector(connector: C, config: Config) -> Session<C> {
        let (logger, log_queue) = session_logger(&config);
        Session::build(connector, config, logger, log_queue)
    }

    fn build(connector: C, config: Config, logger: Logger, log_queue: Option<LogQueue>) -> Session<C> {
        let mut dispatcher = Dispatcher::new();
        dispatcher.set_logger(logger.clone());
        Session {
            connector,
            config,
            state: SessionState::Disconnected,
            dispatcher,
            negotiator: None,
            link: None,
            jid: None,
            pending: VecDeque::new(),
            signal: Arc::new(Signal::default()),
            logger,
            log_queue,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The JID the server bound us to, while logged in.
    pub fn bound_jid(&self) -> Option<&Jid> {
        self.jid.as_ref()
    }

    /// The configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The handler registry.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The handler registry, for registering boxed handlers.
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// A handle to stop [`execute`][Session::execute] from elsewhere.
    pub fn disconnect_handle(&self) -> DisconnectHandle {
        DisconnectHandle {
            signal: self.signal.clone(),
        }
    }

    /// Add a handler for `name`, after those already registered.
    pub fn set_handler<F>(&mut self, name: EventName, handler: F)
    where
        F: FnMut(&Event, &mut Actions) -> HandlerResult + Send + 'static,
    {
        self.dispatcher.register(name, handler);
    }

    /// Make `handler` the only handler for `name`.
    pub fn replace_handler<F>(&mut self, name: EventName, handler: F)
    where
        F: FnMut(&Event, &mut Actions) -> HandlerResult + Send + 'static,
    {
        self.dispatcher.replace(name, handler);
    }

    fn invalid(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            operation,
            state: self.state,
        }
    }

    fn enter(&mut self, state: SessionState) {
        log_to!(self.logger, Level::Debug, "Session state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Fire the queued log lines as `debug_log` events.
    fn flush_log(&mut self) {
        let Some(queue) = &self.log_queue else {
            return;
        };
        let lines: Vec<(Level, String)> = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for (level, message) in lines {
            let mut actions = Actions::new();
            self.dispatcher.emit(&Event::log(level, message), &mut actions);
            self.pending.extend(actions);
        }
    }

    fn fire(&mut self, event: Event) {
        self.flush_log();
        let mut actions = Actions::new();
        self.dispatcher.emit(&event, &mut actions);
        self.pending.extend(actions);
    }

    fn debug_log(&mut self, level: Level, message: String) {
        log_to!(self.logger, level, "{}", message);
        self.flush_log();
    }

    /// Connect and open the stream, including STARTTLS. Fires `connected`
    /// and runs whatever its handlers queued, typically a login.
    ///
    /// Connection and negotiation failures end the session and are only
    /// returned.
    pub async fn connect(&mut self) -> Result<(), Error> {
        if self.state != SessionState::Disconnected {
            return Err(self.invalid("connect"));
        }
        self.enter(SessionState::Connecting);
        self.debug_log(Level::Info, format!("Connecting to {}", self.config.server));
        let connection = match self.connector.connect().await {
            Ok(connection) => connection,
            Err(e) => {
                self.debug_log(Level::Warn, format!("Connection failed: {}", e));
                self.enter(SessionState::Terminated);
                return Err(e.into());
            }
        };

        self.enter(SessionState::Negotiating);
        let mut negotiator =
            Negotiator::new(self.config.negotiation_config()).with_logger(self.logger.clone());
        let mut open = match negotiator.open(connection).await {
            Ok(open) => open,
            Err(e) => {
                self.debug_log(Level::Warn, format!("Stream negotiation failed: {}", e));
                self.enter(SessionState::Terminated);
                return Err(e.into());
            }
        };
        let tls = open.stream_mut().tls_state();
        let message = format!(
            "Stream {} open, TLS {:?}",
            open.header().id.as_deref().unwrap_or("(no id)"),
            tls
        );
        self.debug_log(Level::Debug, message);
        self.negotiator = Some(negotiator);
        self.link = Some(Link::Open(open));
        self.fire(Event::new(EventName::Connected));
        self.run_actions().await
    }

    /// Authenticate and bind a resource. Fires `authenticated`, or
    /// `authfailure` after which the session is terminated.
    pub async fn login(&mut self) -> Result<(), Error> {
        let open = match self.link.take() {
            Some(Link::Open(open)) => open,
            other => {
                self.link = other;
                return Err(self.invalid("log in"));
            }
        };
        let Some(mut negotiator) = self.negotiator.take() else {
            self.link = Some(Link::Open(open));
            return Err(self.invalid("log in"));
        };
        match negotiator.authenticate(open).await {
            Ok(negotiated) => {
                self.enter(SessionState::Authenticated);
                self.debug_log(
                    Level::Info,
                    format!(
                        "Authenticated as {} using {}",
                        negotiated.jid, negotiated.mechanism
                    ),
                );
                self.dispatcher.set_own_jid(Some(negotiated.jid.clone()));
                self.jid = Some(negotiated.jid);
                self.link = Some(Link::Ready(negotiated.stream));
                self.fire(Event::new(EventName::Authenticated));
                Ok(())
            }
            Err(e) => {
                let e = Arc::new(e);
                let info = ErrorInfo::new(ErrorKind::of_negotiation(&e), e.to_string())
                    .with_source(e.clone());
                let name = match info.kind {
                    ErrorKind::AuthRejected | ErrorKind::NoMechanism | ErrorKind::Sasl => {
                        EventName::AuthFailure
                    }
                    _ => EventName::Error,
                };
                self.debug_log(Level::Warn, format!("Login failed: {}", e));
                self.fire(Event::failure(name, info));
                self.shutdown().await;
                Err(Error::Login(e))
            }
        }
    }

    async fn send(&mut self, stanza: &Stanza, operation: &'static str) -> Result<(), Error> {
        let stream = match self.link.as_mut() {
            Some(Link::Ready(stream)) => stream,
            _ => return Err(self.invalid(operation)),
        };
        let sent = stream.send_element(stanza.element()).await;
        self.flush_log();
        match sent {
            Ok(()) => Ok(()),
            Err(e) => {
                let e = IoError::from_io(e);
                self.connection_lost(&e).await;
                Err(e.into())
            }
        }
    }

    /// Broadcast presence; empty strings are left out.
    pub async fn set_presence(&mut self, show: &str, status: &str) -> Result<(), Error> {
        self.send(&Stanza::presence(show, status), "set presence")
            .await
    }

    /// Send a message of the given type.
    pub async fn send_message(&mut self, to: &Jid, type_: &str, body: &str) -> Result<(), Error> {
        let message = Stanza::message(to, type_, Some(body));
        self.send(&message, "send a message").await
    }

    /// Send any stanza as is.
    pub async fn send_stanza(&mut self, stanza: Stanza) -> Result<(), Error> {
        self.send(&stanza, "send a stanza").await
    }

    /// Send an IQ request; its reply fires `success` or `failure`. Returns
    /// the request id, generated if the IQ had none.
    pub async fn send_tracked_iq(
        &mut self,
        mut iq: Stanza,
        success: EventName,
        failure: EventName,
    ) -> Result<String, Error> {
        if !matches!(self.link, Some(Link::Ready(_))) {
            return Err(self.invalid("send an IQ"));
        }
        let id = iq.ensure_id();
        let to = iq.to().map(str::parse::<Jid>).transpose()?;
        self.dispatcher
            .track_iq(to, id.clone(), IqOutcome { success, failure });
        self.send(&iq, "send an IQ").await?;
        Ok(id)
    }

    async fn roster_request(
        &mut self,
        type_: &str,
        query: Element,
        success: EventName,
        failure: EventName,
    ) -> Result<String, Error> {
        let iq = Stanza::iq(type_, None, &make_id(), query);
        self.send_tracked_iq(iq, success, failure).await
    }

    /// Fetch the roster; it arrives as `rosterupdate`.
    pub async fn request_roster(&mut self) -> Result<String, Error> {
        self.roster_request(
            "get",
            roster::query(),
            EventName::RosterUpdate,
            EventName::Error,
        )
        .await
    }

    /// Add a contact; reported as `rosteradded` or `rosteraddfailure`.
    pub async fn roster_add(&mut self, item: RosterItem) -> Result<String, Error> {
        self.roster_request(
            "set",
            roster::query_with(&item),
            EventName::RosterAdded,
            EventName::RosterAddFailure,
        )
        .await
    }

    /// Change a contact; reported as `rosterupdate` or `error`.
    pub async fn roster_update(&mut self, item: RosterItem) -> Result<String, Error> {
        self.roster_request(
            "set",
            roster::query_with(&item),
            EventName::RosterUpdate,
            EventName::Error,
        )
        .await
    }

    /// Remove a contact; reported as `rosterremoved` or
    /// `rosterremovefailure`.
    pub async fn roster_remove(&mut self, jid: Jid) -> Result<String, Error> {
        self.roster_request(
            "set",
            roster::removal(jid.to_bare()),
            EventName::RosterRemoved,
            EventName::RosterRemoveFailure,
        )
        .await
    }

    async fn perform(&mut self, action: Action) -> Result<(), Error> {
        let result = match action {
            Action::Login => return self.login().await,
            Action::Disconnect => {
                self.disconnect().await;
                return Ok(());
            }
            Action::SetPresence { show, status } => self.set_presence(&show, &status).await,
            Action::SendMessage { to, type_, body } => {
                self.send_message(&to, &type_, &body).await
            }
            Action::SendStanza(stanza) => self.send_stanza(stanza).await,
            Action::SendTrackedIq {
                iq,
                success,
                failure,
            } => self.send_tracked_iq(iq, success, failure).await.map(drop),
            Action::RequestRoster => self.request_roster().await.map(drop),
            Action::RosterAdd(item) => self.roster_add(item).await.map(drop),
            Action::RosterUpdate(item) => self.roster_update(item).await.map(drop),
            Action::RosterRemove(jid) => self.roster_remove(jid).await.map(drop),
        };
        // Lost connections already went out as events.
        if let Err(e) = result {
            self.debug_log(Level::Warn, format!("Queued action failed: {}", e));
        }
        Ok(())
    }

    async fn run_actions(&mut self) -> Result<(), Error> {
        while let Some(action) = self.pending.pop_front() {
            if self.state == SessionState::Terminated {
                log_to!(
                    self.logger,
                    Level::Debug,
                    "Dropping {} queued actions after termination",
                    self.pending.len() + 1
                );
                self.pending.clear();
                break;
            }
            self.perform(action).await?;
        }
        Ok(())
    }

    fn dispatch_element(&mut self, element: Element) {
        let mut actions = Actions::new();
        self.dispatcher.dispatch_element(element, &mut actions);
        self.pending.extend(actions);
    }

    async fn connection_lost(&mut self, error: &IoError) {
        match error {
            IoError::Closed => self.debug_log(Level::Info, String::from("Server closed the stream")),
            IoError::Reset(e) => {
                self.debug_log(Level::Warn, format!("Connection lost: {}", e));
                self.fire(Event::failure(
                    EventName::Error,
                    ErrorInfo::new(ErrorKind::Reset, error.to_string()),
                ));
            }
        }
        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        let was_connected = self.state >= SessionState::Negotiating;
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.stream_mut().close().await {
                log_to!(self.logger, Level::Debug, "Closing the stream failed: {}", e);
            }
        }
        self.negotiator = None;
        self.jid = None;
        self.dispatcher.set_own_jid(None);
        self.dispatcher.forget_iqs();
        self.enter(SessionState::Terminated);
        if was_connected {
            self.fire(Event::new(EventName::Disconnected));
        }
        self.fire(Event::new(EventName::Terminated));
    }

    /// Close the stream and terminate. Fires `disconnected` if a stream was
    /// open, then `terminated`. Does nothing once terminated.
    pub async fn disconnect(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        self.debug_log(Level::Info, String::from("Disconnecting"));
        self.shutdown().await;
    }

    /// Run the event loop: dispatch incoming stanzas and fire `heartbeat`
    /// every `poll_interval`, until `run_for` elapses, the stream ends or a
    /// disconnect is requested. [`RunFor::For`] a zero duration returns
    /// immediately.
    ///
    /// Only a failing queued login is returned as an error; everything else
    /// is reported through events.
    pub async fn execute(&mut self, poll_interval: Duration, run_for: RunFor) -> Result<(), Error> {
        let deadline = match run_for {
            RunFor::For(duration) if duration.is_zero() => return Ok(()),
            RunFor::For(duration) => Some(Instant::now() + duration),
            RunFor::Unbounded => None,
        };
        if self.state == SessionState::Terminated {
            return Ok(());
        }
        if self.link.is_none() {
            return Err(self.invalid("execute"));
        }

        let poll_interval = poll_interval.max(Duration::from_millis(1));
        let mut heartbeat = time::interval_at(Instant::now() + poll_interval, poll_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let signal = self.signal.clone();

        self.run_actions().await?;
        while self.state != SessionState::Terminated && !signal.requested.load(Ordering::SeqCst) {
            let step = {
                let Some(link) = self.link.as_mut() else {
                    break;
                };
                let stream = link.stream_mut();
                tokio::select! {
                    _ = signal.notify.notified() => Step::Wakeup,
                    _ = sleep_until(deadline) => Step::Deadline,
                    _ = heartbeat.tick() => Step::Heartbeat,
                    item = stream.next() => Step::Received(item),
                }
            };
            match step {
                Step::Wakeup => (),
                Step::Deadline => {
                    log_to!(self.logger, Level::Trace, "Run time elapsed");
                    break;
                }
                Step::Heartbeat => self.fire(Event::new(EventName::Heartbeat)),
                Step::Received(Some(Ok(element))) => {
                    self.flush_log();
                    self.dispatch_element(element)
                }
                Step::Received(Some(Err(e))) => self.connection_lost(&e).await,
                Step::Received(None) => self.connection_lost(&IoError::Closed).await,
            }
            self.flush_log();
            self.run_actions().await?;
        }

        if signal.requested.swap(false, Ordering::SeqCst) {
            self.disconnect().await;
        }
        Ok(())
    }
}
