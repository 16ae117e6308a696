// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Translate stanzas into catalogue events.

use log::Level;
use tokio_jabber::logging::Logger;
use tokio_jabber::minidom::Element;
use tokio_jabber::parsers::chatstates::ChatState;
use tokio_jabber::parsers::presence::{Presence, Show};
use tokio_jabber::parsers::stanza_error::{DefinedCondition, ErrorType};
use tokio_jabber::{log_to, ns, Jid, Stanza};

use crate::delay::StanzaTimeInfo;
use crate::error::{ErrorInfo, ErrorKind};
use crate::event::{Event, EventName, MessagePayload, Payload, PresencePayload};
use crate::iq::IqTracker;
use crate::roster;

/// Events raised by one stanza, and the reply the protocol demands.
#[derive(Debug)]
pub(crate) struct Classified {
    pub(crate) events: Vec<Event>,
    pub(crate) reply: Option<Stanza>,
}

impl Classified {
    fn one(event: Event) -> Classified {
        Classified::many(vec![event])
    }

    fn many(events: Vec<Event>) -> Classified {
        Classified {
            events,
            reply: None,
        }
    }
}

fn parse_jid(value: Option<&str>, logger: &Logger) -> Option<Jid> {
    let value = value?;
    match value.parse() {
        Ok(jid) => Some(jid),
        Err(e) => {
            log_to!(logger, Level::Debug, "Ignoring invalid JID {:?}: {}", value, e);
            None
        }
    }
}

fn show_str(show: &Show) -> &'static str {
    match show {
        Show::Away => "away",
        Show::Chat => "chat",
        Show::Dnd => "dnd",
        Show::Xa => "xa",
    }
}

fn child_text(element: &Element, name: &str) -> Option<String> {
    element.get_child(name, ns::JABBER_CLIENT).map(Element::text)
}

fn unclassified<M: Into<String>>(stanza: Stanza, message: M) -> Event {
    Event::failure(
        EventName::Error,
        ErrorInfo {
            stanza: Some(stanza),
            ..ErrorInfo::new(ErrorKind::Unclassified, message)
        },
    )
}

/// Classify a stanza. IQ replies are matched against `tracker`.
pub(crate) fn classify(stanza: Stanza, tracker: &mut IqTracker, logger: &Logger) -> Classified {
    match stanza {
        Stanza::Message(_) => Classified::many(message(stanza, logger)),
        Stanza::Presence(_) => Classified::one(presence(stanza, logger)),
        Stanza::Iq(_) => iq(stanza, tracker, logger),
        Stanza::StreamError(_) => Classified::one(Event::failure(
            EventName::StreamError,
            ErrorInfo::from_stanza(ErrorKind::StreamError, stanza),
        )),
    }
}

/// `msgevent_*` notifications carried by a body-less message.
fn message_events(element: &Element) -> Vec<EventName> {
    let mut names = Vec::new();
    let mut push = |name: EventName| {
        if !names.contains(&name) {
            names.push(name);
        }
    };

    if let Some(x) = element.get_child("x", ns::EVENT) {
        let mut notified = false;
        for (child, name) in [
            ("composing", EventName::MsgeventComposingStart),
            ("delivered", EventName::MsgeventDelivered),
            ("displayed", EventName::MsgeventDisplayed),
            ("offline", EventName::MsgeventOffline),
        ] {
            if x.has_child(child, ns::EVENT) {
                push(name);
                notified = true;
            }
        }
        // An event carrying only the id cancels a composing notification.
        if !notified && x.has_child("id", ns::EVENT) {
            push(EventName::MsgeventComposingStop);
        }
    }

    for child in element.children().filter(|c| c.ns() == ns::CHATSTATES) {
        match ChatState::try_from(child.clone()) {
            Ok(ChatState::Composing) => push(EventName::MsgeventComposingStart),
            Ok(ChatState::Paused | ChatState::Active | ChatState::Inactive | ChatState::Gone) => {
                push(EventName::MsgeventComposingStop)
            }
            Err(_) => (),
        }
    }
    names
}

fn message(stanza: Stanza, logger: &Logger) -> Vec<Event> {
    if stanza.type_() == Some("error") {
        return vec![Event::failure(
            EventName::Error,
            ErrorInfo::from_stanza(ErrorKind::Stanza, stanza),
        )];
    }

    let element = stanza.element();
    let type_ = match stanza.type_() {
        Some(type_) if !type_.is_empty() => type_.to_owned(),
        _ => String::from("normal"),
    };
    let body = child_text(element, "body");

    let mut names = match body {
        None => message_events(element),
        Some(_) => Vec::new(),
    };
    if names.is_empty() {
        names.push(EventName::for_message_type(&type_));
    }

    let payload = MessagePayload {
        from: parse_jid(stanza.from(), logger),
        to: parse_jid(stanza.to(), logger),
        body,
        subject: child_text(element, "subject"),
        thread: child_text(element, "thread"),
        id: stanza.id().map(str::to_owned),
        time: StanzaTimeInfo::now(element),
        type_,
        stanza: stanza.clone(),
    };
    names
        .into_iter()
        .map(|name| Event::with_payload(name, Payload::Message(payload.clone())))
        .collect()
}

fn presence(stanza: Stanza, logger: &Logger) -> Event {
    let name = match stanza.type_() {
        None | Some("") | Some("unavailable") => EventName::ContactUpdated,
        Some("subscribe") => EventName::Subscribe,
        Some("subscribed") => EventName::Subscribed,
        Some("unsubscribe") => EventName::Unsubscribe,
        Some("unsubscribed") => EventName::Unsubscribed,
        Some("probe") => EventName::Probe,
        Some("error") => {
            return Event::failure(
                EventName::ContactUpdateFailure,
                ErrorInfo::from_stanza(ErrorKind::Stanza, stanza),
            )
        }
        Some(other) => {
            let message = format!("presence of unknown type {:?}", other);
            return unclassified(stanza, message);
        }
    };

    let parsed = match Presence::try_from(stanza.element().clone()) {
        Ok(parsed) => parsed,
        Err(e) => {
            let message = format!("invalid presence: {}", e);
            return unclassified(stanza, message);
        }
    };
    let status = parsed
        .statuses
        .get("")
        .or_else(|| parsed.statuses.values().next())
        .cloned();
    let payload = PresencePayload {
        from: parse_jid(stanza.from(), logger),
        type_: stanza.type_().filter(|t| !t.is_empty()).map(str::to_owned),
        show: parsed.show.as_ref().map(|show| show_str(show).to_owned()),
        status,
        priority: child_text(stanza.element(), "priority")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(0),
        stanza: stanza.clone(),
    };
    Event::with_payload(name, Payload::Presence(payload))
}

fn iq(stanza: Stanza, tracker: &mut IqTracker, logger: &Logger) -> Classified {
    let from = parse_jid(stanza.from(), logger);
    let id = stanza.id().unwrap_or_default().to_owned();
    let roster_query = stanza.element().get_child("query", ns::ROSTER).cloned();

    match stanza.type_() {
        Some(type_ @ ("result" | "error")) => {
            let is_result = type_ == "result";
            if let Some(outcome) = tracker.resolve(from.as_ref(), &id) {
                let event = if is_result {
                    let payload = match &roster_query {
                        Some(query) => Payload::Roster(roster::parse_query(query)),
                        None => Payload::Stanza(stanza),
                    };
                    Event::with_payload(outcome.success, payload)
                } else {
                    Event::failure(
                        outcome.failure,
                        ErrorInfo::from_stanza(ErrorKind::Stanza, stanza),
                    )
                };
                return Classified::one(event);
            }

            if !is_result {
                return Classified::one(Event::failure(
                    EventName::Error,
                    ErrorInfo::from_stanza(ErrorKind::Stanza, stanza),
                ));
            }
            if stanza.element().has_child("query", ns::PRIVATE) {
                return Classified::one(Event::with_payload(
                    EventName::PrivateData,
                    Payload::Stanza(stanza),
                ));
            }
            if let Some(query) = roster_query {
                return Classified::one(Event::with_payload(
                    EventName::RosterUpdate,
                    Payload::Roster(roster::parse_query(&query)),
                ));
            }
            let message = format!("unsolicited iq result {:?}", id);
            Classified::one(unclassified(stanza, message))
        }
        Some(type_ @ ("get" | "set")) => {
            if type_ == "set" && tracker.is_own_account(from.as_ref()) {
                if let Some(query) = roster_query {
                    return Classified {
                        reply: Some(stanza.iq_result(None)),
                        events: vec![Event::with_payload(
                            EventName::RosterUpdate,
                            Payload::Roster(roster::parse_query(&query)),
                        )],
                    };
                }
            }
            let payload_ns = stanza
                .element()
                .children()
                .next()
                .map(|payload| payload.ns())
                .unwrap_or_default();
            let reply = stanza.iq_error(ErrorType::Cancel, DefinedCondition::ServiceUnavailable);
            let message = format!("unhandled iq {} for {:?}", type_, payload_ns);
            Classified {
                events: vec![unclassified(stanza, message)],
                reply: Some(reply),
            }
        }
        other => {
            let message = format!("iq of unknown type {:?}", other);
            Classified::one(unclassified(stanza, message))
        }
    }
}
