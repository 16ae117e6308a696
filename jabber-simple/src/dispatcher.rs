// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Routing of events to registered handlers.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::Level;
use tokio_jabber::logging::Logger;
use tokio_jabber::minidom::Element;
use tokio_jabber::{log_to, Jid, Stanza};

use crate::actions::Actions;
use crate::classify::classify;
use crate::error::{ErrorInfo, ErrorKind, HandlerError};
use crate::event::{Event, EventName};
use crate::iq::{IqOutcome, IqTracker};

/// What a handler returns.
pub type HandlerResult = Result<(), HandlerError>;

/// A registered callback.
pub type Handler = Box<dyn FnMut(&Event, &mut Actions) -> HandlerResult + Send>;

/// The callback registry.
///
/// Every event name maps to a list of handlers, invoked in registration
/// order. A handler failure, be it an `Err` or a panic, is caught here and
/// reported through the [`EventName::Error`] handlers, so one misbehaving
/// handler cannot stop the others or the session.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<EventName, Vec<Handler>>,
    iq: IqTracker,
    logger: Logger,
}

impl core::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut counts: Vec<(EventName, usize)> = self
            .handlers
            .iter()
            .map(|(name, handlers)| (*name, handlers.len()))
            .collect();
        counts.sort();
        f.debug_struct("Dispatcher")
            .field("handlers", &counts)
            .field("iq", &self.iq)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", message)
    } else {
        String::from("handler panicked")
    }
}

impl Dispatcher {
    /// An empty registry.
    pub fn new() -> Dispatcher {
        Dispatcher::default()
    }

    /// Append a handler for `name`. Earlier handlers keep running first.
    pub fn register<F>(&mut self, name: EventName, handler: F)
    where
        F: FnMut(&Event, &mut Actions) -> HandlerResult + Send + 'static,
    {
        self.register_boxed(name, Box::new(handler));
    }

    /// Append an already boxed handler.
    pub fn register_boxed(&mut self, name: EventName, handler: Handler) {
        self.handlers.entry(name).or_default().push(handler);
    }

    /// Make `handler` the only handler for `name`.
    pub fn replace<F>(&mut self, name: EventName, handler: F)
    where
        F: FnMut(&Event, &mut Actions) -> HandlerResult + Send + 'static,
    {
        self.handlers.insert(name, vec![Box::new(handler)]);
    }

    /// Drop every handler for `name`.
    pub fn clear(&mut self, name: EventName) {
        self.handlers.remove(&name);
    }

    /// Number of handlers registered for `name`.
    pub fn handler_count(&self, name: EventName) -> usize {
        self.handlers.get(&name).map_or(0, Vec::len)
    }

    /// The IQ requests awaiting an outcome event.
    pub fn iq_tracker(&self) -> &IqTracker {
        &self.iq
    }

    /// Forward the dispatcher's log lines, and those of its IQ tracker, to
    /// `logger` as well.
    pub(crate) fn set_logger(&mut self, logger: Logger) {
        self.iq.set_logger(logger.clone());
        self.logger = logger;
    }

    /// Failures of `debug_log` handlers only reach the log facade, so that
    /// they cannot feed back into `debug_log`.
    fn log_failure(&self, event: EventName, level: Level, failure: &ErrorInfo) {
        if event == EventName::DebugLog {
            log::log!(level, "{}", failure);
        } else {
            log_to!(self.logger, level, "{}", failure);
        }
    }

    pub(crate) fn set_own_jid(&mut self, jid: Option<Jid>) {
        self.iq.set_own_jid(jid);
    }

    pub(crate) fn track_iq(&mut self, to: Option<Jid>, id: String, outcome: IqOutcome) {
        self.iq.track(to, id, outcome);
    }

    pub(crate) fn forget_iqs(&mut self) {
        self.iq.clear();
    }

    /// Invoke the handlers of `event.name()`, routing failures to `error`.
    pub fn emit(&mut self, event: &Event, actions: &mut Actions) {
        let failures = self.invoke(event, actions);
        for failure in failures {
            if event.name() == EventName::Error {
                self.log_failure(event.name(), Level::Error, &failure);
                continue;
            }
            self.log_failure(event.name(), Level::Debug, &failure);
            let report = Event::failure(EventName::Error, failure);
            for nested in self.invoke(&report, actions) {
                self.log_failure(EventName::Error, Level::Error, &nested);
            }
        }
    }

    fn invoke(&mut self, event: &Event, actions: &mut Actions) -> Vec<ErrorInfo> {
        let Some(handlers) = self.handlers.get_mut(&event.name()) else {
            return Vec::new();
        };
        let mut failures = Vec::new();
        for handler in handlers.iter_mut() {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event, actions))) {
                Ok(Ok(())) => (),
                Ok(Err(e)) => failures.push(
                    ErrorInfo::callback(event.name(), e.to_string()).with_source(Arc::from(e)),
                ),
                Err(panic) => {
                    failures.push(ErrorInfo::callback(event.name(), panic_message(&*panic)))
                }
            }
        }
        failures
    }

    /// Classify `stanza` and emit the resulting events. A reply the protocol
    /// requires, e.g. for a roster push, is queued ahead of anything the
    /// handlers queue.
    pub fn dispatch(&mut self, stanza: Stanza, actions: &mut Actions) {
        let classified = classify(stanza, &mut self.iq, &self.logger);
        if let Some(reply) = classified.reply {
            actions.send_stanza(reply);
        }
        for event in &classified.events {
            self.emit(event, actions);
        }
    }

    /// Dispatch a top-level element; anything but a stanza raises `error`.
    pub fn dispatch_element(&mut self, element: Element, actions: &mut Actions) {
        match Stanza::try_from(element) {
            Ok(stanza) => self.dispatch(stanza, actions),
            Err(element) => {
                let info = ErrorInfo::new(
                    ErrorKind::Unclassified,
                    format!("unexpected <{}/> in {}", element.name(), element.ns()),
                );
                self.emit(&Event::failure(EventName::Error, info), actions);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, tag: &'static str) -> impl FnMut(&Event, &mut Actions) -> HandlerResult {
        let log = log.clone();
        move |event, _| {
            log.lock().unwrap().push(format!("{}:{}", tag, event.name()));
            Ok(())
        }
    }

    fn chat(body: &str) -> Stanza {
        let element: Element = format!(
            "<message xmlns='jabber:client' type='chat' from='a@example.org/x'><body>{}</body></message>",
            body
        )
        .parse()
        .unwrap();
        Stanza::try_from(element).unwrap()
    }

    #[test]
    fn test_handlers_run_in_order_once() {
        let log = Log::default();
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(EventName::MessageChat, recorder(&log, "first"));
        dispatcher.register(EventName::MessageChat, recorder(&log, "second"));
        dispatcher.register(EventName::MessageNormal, recorder(&log, "other"));
        dispatcher.register(EventName::Heartbeat, recorder(&log, "other"));

        let mut actions = Actions::new();
        dispatcher.dispatch(chat("hi"), &mut actions);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:message_chat", "second:message_chat"]
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn test_replace_keeps_one_handler() {
        let log = Log::default();
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(EventName::Heartbeat, recorder(&log, "old"));
        dispatcher.register(EventName::Heartbeat, recorder(&log, "old"));
        dispatcher.replace(EventName::Heartbeat, recorder(&log, "new"));
        assert_eq!(dispatcher.handler_count(EventName::Heartbeat), 1);

        dispatcher.emit(&Event::new(EventName::Heartbeat), &mut Actions::new());
        assert_eq!(*log.lock().unwrap(), vec!["new:heartbeat"]);

        dispatcher.clear(EventName::Heartbeat);
        assert_eq!(dispatcher.handler_count(EventName::Heartbeat), 0);
    }

    #[test]
    fn test_failures_route_to_error() {
        let log = Log::default();
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(EventName::MessageChat, |_, _| Err("no thanks".into()));
        dispatcher.register(EventName::MessageChat, |_, _| panic!("kaboom"));
        dispatcher.register(EventName::MessageChat, recorder(&log, "survivor"));
        let errors = log.clone();
        dispatcher.register(EventName::Error, move |event, _| {
            let info = event.error().unwrap();
            assert_eq!(info.kind, ErrorKind::Callback);
            assert_eq!(info.event, Some(EventName::MessageChat));
            errors.lock().unwrap().push(info.message.clone());
            Ok(())
        });

        let mut actions = Actions::new();
        dispatcher.dispatch(chat("one"), &mut actions);
        dispatcher.dispatch(chat("two"), &mut actions);
        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec![
                "survivor:message_chat",
                "no thanks",
                "handler panicked: kaboom",
                "survivor:message_chat",
                "no thanks",
                "handler panicked: kaboom",
            ]
        );
    }

    #[test]
    fn test_failing_error_handler_is_contained() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(EventName::Heartbeat, |_, _| Err("first".into()));
        dispatcher.register(EventName::Error, |_, _| Err("second".into()));
        dispatcher.emit(&Event::new(EventName::Heartbeat), &mut Actions::new());
        dispatcher.emit(
            &Event::failure(EventName::Error, ErrorInfo::new(ErrorKind::Reset, "x")),
            &mut Actions::new(),
        );
    }

    #[test]
    fn test_handlers_queue_actions() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(EventName::MessageChat, |event, actions| {
            let message = event.message().unwrap();
            actions.reply(message, "pong");
            Ok(())
        });
        let mut actions = Actions::new();
        dispatcher.dispatch(chat("ping"), &mut actions);
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn test_non_stanza_element() {
        let seen = Log::default();
        let mut dispatcher = Dispatcher::new();
        let errors = seen.clone();
        dispatcher.register(EventName::Error, move |event, _| {
            errors
                .lock()
                .unwrap()
                .push(event.error().unwrap().message.clone());
            Ok(())
        });
        let element: Element = "<r xmlns='urn:xmpp:sm:3'/>".parse().unwrap();
        dispatcher.dispatch_element(element, &mut Actions::new());
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["unexpected <r/> in urn:xmpp:sm:3"]
        );
    }

    #[derive(Debug, PartialEq)]
    struct QuotaExceeded {
        limit: u32,
    }

    impl core::fmt::Display for QuotaExceeded {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            write!(f, "quota of {} exceeded", self.limit)
        }
    }

    impl std::error::Error for QuotaExceeded {}

    #[test]
    fn test_handler_error_keeps_source() {
        let limits = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(EventName::MessageChat, |_, _| {
            Err(QuotaExceeded { limit: 3 }.into())
        });
        dispatcher.register(EventName::MessageChat, |_, _| panic!("kaboom"));
        let seen = limits.clone();
        dispatcher.register(EventName::Error, move |event, _| {
            let info = event.error().unwrap();
            let limit = info
                .source
                .as_ref()
                .and_then(|source| source.downcast_ref::<QuotaExceeded>())
                .map(|quota| quota.limit);
            seen.lock().unwrap().push((info.message.clone(), limit));
            Ok(())
        });

        dispatcher.dispatch(chat("hi"), &mut Actions::new());
        assert_eq!(
            *limits.lock().unwrap(),
            vec![
                (String::from("quota of 3 exceeded"), Some(3)),
                (String::from("handler panicked: kaboom"), None),
            ]
        );
    }

    #[test]
    fn test_failures_reach_logger() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = lines.clone();
        let mut dispatcher = Dispatcher::new();
        dispatcher.set_logger(Logger::new(Arc::new(move |_, line: &str| {
            sink_lines.lock().unwrap().push(line.to_owned());
        })));
        dispatcher.register(EventName::Heartbeat, |_, _| Err("no thanks".into()));
        dispatcher.register(EventName::DebugLog, |_, _| Err("quiet".into()));

        dispatcher.emit(&Event::new(EventName::Heartbeat), &mut Actions::new());
        dispatcher.emit(
            &Event::log(Level::Debug, String::from("line")),
            &mut Actions::new(),
        );
        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("no thanks"));
    }
}
