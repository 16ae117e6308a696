// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Top-level stanzas of a client stream.
//!
//! A [`Stanza`] keeps the received element untouched, so that payloads this
//! crate knows nothing about survive; typed views such as
//! [`Stanza::error`] are parsed on demand with [`xmpp_parsers`]. The
//! constructors build the few stanzas a client sends on its own.

use std::collections::BTreeMap;

use log::debug;
use minidom::Element;
use rand::{thread_rng, Rng};
use xmpp_parsers::jid::Jid;
use xmpp_parsers::message::{Body, Message, MessageType};
use xmpp_parsers::presence::{Presence, Show, Type as PresenceType};
use xmpp_parsers::stanza_error::{DefinedCondition, ErrorType, StanzaError};

use crate::ns;

/// Generate a fresh stanza id.
pub fn make_id() -> String {
    let id: u64 = thread_rng().gen();
    format!("{}", id)
}

/// Local name of a defined condition, e.g. `item-not-found`.
pub fn condition_name(condition: &DefinedCondition) -> String {
    Element::from(condition.clone()).name().to_owned()
}

fn message_type(type_: &str) -> MessageType {
    match type_ {
        "chat" => MessageType::Chat,
        "groupchat" => MessageType::Groupchat,
        "headline" => MessageType::Headline,
        _ => MessageType::Normal,
    }
}

fn show(show: &str) -> Option<Show> {
    match show {
        "" => None,
        "away" => Some(Show::Away),
        "chat" => Some(Show::Chat),
        "dnd" => Some(Show::Dnd),
        "xa" => Some(Show::Xa),
        other => {
            debug!("Ignoring unknown presence show {:?}", other);
            None
        }
    }
}

/// A stanza sent/received over the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Stanza {
    /// Message stanza
    Message(Element),

    /// Presence stanza
    Presence(Element),

    /// IQ stanza
    Iq(Element),

    /// `<stream:error/>`, which ends the stream
    StreamError(Element),
}

impl Stanza {
    /// The wrapped element.
    pub fn element(&self) -> &Element {
        match self {
            Stanza::Message(e) | Stanza::Presence(e) | Stanza::Iq(e) | Stanza::StreamError(e) => e,
        }
    }

    /// Unwrap the element.
    pub fn into_element(self) -> Element {
        match self {
            Stanza::Message(e) | Stanza::Presence(e) | Stanza::Iq(e) | Stanza::StreamError(e) => e,
        }
    }

    fn element_mut(&mut self) -> &mut Element {
        match self {
            Stanza::Message(e) | Stanza::Presence(e) | Stanza::Iq(e) | Stanza::StreamError(e) => e,
        }
    }

    /// The `type` attribute.
    pub fn type_(&self) -> Option<&str> {
        self.element().attr("type")
    }

    /// The `id` attribute.
    pub fn id(&self) -> Option<&str> {
        self.element().attr("id")
    }

    /// The `from` attribute.
    pub fn from(&self) -> Option<&str> {
        self.element().attr("from")
    }

    /// The `to` attribute.
    pub fn to(&self) -> Option<&str> {
        self.element().attr("to")
    }

    /// Assign a random ID to the stanza, if no ID has been assigned yet.
    pub fn ensure_id(&mut self) -> String {
        if let Some(id) = self.id() {
            if !id.is_empty() {
                return id.to_owned();
            }
        }
        let id = make_id();
        self.element_mut().set_attr("id", id.clone());
        id
    }

    /// A `<message/>` of type `chat`, `groupchat`, `headline` or `normal`,
    /// with an optional body. Other types are sent as `normal`.
    pub fn message(to: &Jid, type_: &str, body: Option<&str>) -> Stanza {
        let mut message = Message::new(Some(to.clone()));
        message.type_ = message_type(type_);
        if let Some(body) = body {
            message
                .bodies
                .insert(String::new(), Body(String::from(body)));
        }
        Stanza::Message(message.into())
    }

    /// An available `<presence/>` with the given `<show/>` and `<status/>`;
    /// empty strings are left out.
    pub fn presence(show_: &str, status: &str) -> Stanza {
        let mut presence = Presence::new(PresenceType::None);
        presence.show = show(show_);
        if !status.is_empty() {
            presence.set_status(String::new(), status);
        }
        Stanza::Presence(presence.into())
    }

    /// An `<iq/>` request of the given type with one payload.
    pub fn iq(type_: &str, to: Option<&str>, id: &str, payload: Element) -> Stanza {
        Stanza::Iq(
            Element::builder("iq", ns::JABBER_CLIENT)
                .attr("type", type_)
                .attr("id", id)
                .attr("to", to)
                .append(payload)
                .build(),
        )
    }

    /// The `result` reply to this IQ, with an optional payload.
    pub fn iq_result(&self, payload: Option<Element>) -> Stanza {
        Stanza::Iq(
            Element::builder("iq", ns::JABBER_CLIENT)
                .attr("type", "result")
                .attr("id", self.id().unwrap_or_default())
                .attr("to", self.from())
                .append_all(payload)
                .build(),
        )
    }

    /// The `error` reply to this IQ.
    pub fn iq_error(&self, type_: ErrorType, condition: DefinedCondition) -> Stanza {
        let error = StanzaError {
            type_,
            by: None,
            defined_condition: condition,
            texts: BTreeMap::new(),
            other: None,
        };
        Stanza::Iq(
            Element::builder("iq", ns::JABBER_CLIENT)
                .attr("type", "error")
                .attr("id", self.id().unwrap_or_default())
                .attr("to", self.from())
                .append(Element::from(error))
                .build(),
        )
    }

    /// The `<error/>` child of an error stanza.
    ///
    /// `None` for stream errors, stanzas without one, and errors which do
    /// not follow RFC 6120.
    pub fn error(&self) -> Option<StanzaError> {
        if let Stanza::StreamError(_) = self {
            return None;
        }
        let error = self.element().get_child("error", ns::JABBER_CLIENT)?;
        match StanzaError::try_from(error.clone()) {
            Ok(error) => Some(error),
            Err(_) => {
                debug!("Ignoring malformed <error/> in {}", self.element().name());
                None
            }
        }
    }

    /// The defined condition of an error stanza or a stream error, e.g.
    /// `item-not-found`.
    pub fn error_condition(&self) -> Option<String> {
        match self {
            Stanza::StreamError(element) => element
                .children()
                .find(|c| c.ns() == ns::XMPP_STREAMS && c.name() != "text")
                .map(|c| c.name().to_owned()),
            _ => self
                .error()
                .map(|error| condition_name(&error.defined_condition)),
        }
    }

    /// The human readable `<text/>` of an error stanza or stream error.
    pub fn error_text(&self) -> Option<String> {
        match self {
            Stanza::StreamError(element) => element
                .get_child("text", ns::XMPP_STREAMS)
                .map(Element::text),
            _ => {
                let error = self.error()?;
                let text = error.texts.get("en").or_else(|| error.texts.values().next());
                text.cloned()
            }
        }
    }
}

impl TryFrom<Element> for Stanza {
    type Error = Element;

    /// Classify a top-level element; anything else is handed back.
    fn try_from(element: Element) -> Result<Stanza, Element> {
        if element.is("error", ns::STREAM) {
            return Ok(Stanza::StreamError(element));
        }
        if element.ns() != ns::JABBER_CLIENT {
            return Err(element);
        }
        match element.name() {
            "message" => Ok(Stanza::Message(element)),
            "presence" => Ok(Stanza::Presence(element)),
            "iq" => Ok(Stanza::Iq(element)),
            _ => Err(element),
        }
    }
}

impl From<Stanza> for Element {
    fn from(stanza: Stanza) -> Element {
        stanza.into_element()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stanza(xml: &str) -> Stanza {
        let element: Element = xml.parse().unwrap();
        Stanza::try_from(element).unwrap()
    }

    #[test]
    fn test_classify() {
        let elem: Element = "<message xmlns='jabber:client'/>".parse().unwrap();
        assert!(matches!(Stanza::try_from(elem), Ok(Stanza::Message(_))));
        let stanza = stanza("<stream:error xmlns:stream='http://etherx.jabber.org/streams'><conflict xmlns='urn:ietf:params:xml:ns:xmpp-streams'/></stream:error>");
        assert!(matches!(stanza, Stanza::StreamError(_)));
        assert_eq!(stanza.error_condition().as_deref(), Some("conflict"));
        let elem: Element = "<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>"
            .parse()
            .unwrap();
        assert!(Stanza::try_from(elem).is_err());
    }

    #[test]
    fn test_ensure_id() {
        let mut stanza = Stanza::presence("", "");
        let id = stanza.ensure_id();
        assert!(!id.is_empty());
        assert_eq!(stanza.ensure_id(), id);
        assert_eq!(stanza.id(), Some(id.as_str()));
    }

    #[test]
    fn test_message_builder() {
        let to: Jid = "a@example.org".parse().unwrap();
        let stanza = Stanza::message(&to, "chat", Some("hello"));
        let elem = stanza.element();
        assert_eq!(elem.attr("type"), Some("chat"));
        assert_eq!(elem.attr("to"), Some("a@example.org"));
        assert_eq!(
            elem.get_child("body", ns::JABBER_CLIENT).unwrap().text(),
            "hello"
        );
        let normal = Stanza::message(&to, "normal", None);
        assert!(matches!(normal.type_(), None | Some("normal")));
        assert!(!normal.element().has_child("body", ns::JABBER_CLIENT));
    }

    #[test]
    fn test_presence_builder() {
        let stanza = Stanza::presence("", "At your Service");
        let elem = stanza.element();
        assert_eq!(elem.attr("type"), None);
        assert!(!elem.has_child("show", ns::JABBER_CLIENT));
        assert_eq!(
            elem.get_child("status", ns::JABBER_CLIENT).unwrap().text(),
            "At your Service"
        );
        let away = Stanza::presence("away", "");
        assert_eq!(
            away.element()
                .get_child("show", ns::JABBER_CLIENT)
                .unwrap()
                .text(),
            "away"
        );
        assert!(!away.element().has_child("status", ns::JABBER_CLIENT));
    }

    #[test]
    fn test_iq_error_reply() {
        let request = stanza("<iq xmlns='jabber:client' type='get' id='v1' from='peer@example.org/x'><query xmlns='jabber:iq:version'/></iq>");
        let reply = request.iq_error(ErrorType::Cancel, DefinedCondition::ServiceUnavailable);
        assert_eq!(reply.type_(), Some("error"));
        assert_eq!(reply.id(), Some("v1"));
        assert_eq!(reply.to(), Some("peer@example.org/x"));
        assert_eq!(reply.error_condition().as_deref(), Some("service-unavailable"));
        assert_eq!(reply.error().unwrap().type_, ErrorType::Cancel);
    }

    #[test]
    fn test_iq_result_reply() {
        let request = stanza("<iq xmlns='jabber:client' type='set' id='push1'><query xmlns='jabber:iq:roster'/></iq>");
        let reply = request.iq_result(None);
        assert_eq!(reply.type_(), Some("result"));
        assert_eq!(reply.id(), Some("push1"));
        assert_eq!(reply.to(), None);
        assert_eq!(reply.element().children().count(), 0);
    }

    #[test]
    fn test_error_text() {
        let stanza = stanza("<message xmlns='jabber:client' type='error'><error type='cancel'><item-not-found xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/><text xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'>gone</text></error></message>");
        assert_eq!(stanza.error_condition().as_deref(), Some("item-not-found"));
        assert_eq!(stanza.error_text().as_deref(), Some("gone"));
    }

    #[test]
    fn test_malformed_error() {
        // No type attribute.
        let stanza = stanza("<iq xmlns='jabber:client' type='error' id='x'><error><conflict xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></error></iq>");
        assert!(stanza.error().is_none());
        assert_eq!(stanza.error_condition(), None);
    }
}
