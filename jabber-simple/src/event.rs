// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The event vocabulary handlers subscribe to.

use core::fmt;
use core::str::FromStr;

use log::Level;
use tokio_jabber::{Jid, Stanza};

use crate::delay::StanzaTimeInfo;
use crate::error::ErrorInfo;
use crate::roster::RosterItem;

macro_rules! event_names {
    ($($variant:ident => $name:literal,)+) => {
        /// Name of an event a handler can be registered for.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventName {
            $(
                #[doc = concat!("`", $name, "`")]
                $variant,
            )+
        }

        impl EventName {
            /// Every event name, in catalogue order.
            pub const ALL: &'static [EventName] = &[$(EventName::$variant,)+];

            /// The name as used by handler conventions, e.g. `message_chat`.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(EventName::$variant => $name,)+
                }
            }
        }

        impl FromStr for EventName {
            type Err = UnknownEvent;

            fn from_str(s: &str) -> Result<EventName, UnknownEvent> {
                match s {
                    $($name => Ok(EventName::$variant),)+
                    _ => Err(UnknownEvent(s.to_owned())),
                }
            }
        }
    };
}

event_names! {
    Connected => "connected",
    Disconnected => "disconnected",
    Authenticated => "authenticated",
    AuthFailure => "authfailure",
    Error => "error",
    Heartbeat => "heartbeat",
    MessageChat => "message_chat",
    MessageGroupchat => "message_groupchat",
    MessageHeadline => "message_headline",
    MessageNormal => "message_normal",
    MsgeventComposingStart => "msgevent_composing_start",
    MsgeventComposingStop => "msgevent_composing_stop",
    MsgeventDelivered => "msgevent_delivered",
    MsgeventDisplayed => "msgevent_displayed",
    MsgeventOffline => "msgevent_offline",
    Registered => "registered",
    RegFailure => "regfailure",
    Deregistered => "deregistered",
    DeregFailure => "deregfailure",
    PasswordChanged => "passwordchanged",
    PasswordFailure => "passwordfailure",
    RosterAdded => "rosteradded",
    RosterAddFailure => "rosteraddfailure",
    RosterRemoved => "rosterremoved",
    RosterRemoveFailure => "rosterremovefailure",
    RosterUpdate => "rosterupdate",
    ServiceFieldsFailure => "servicefieldsfailure",
    ServiceRegFailure => "serviceregfailure",
    ServiceRegistered => "serviceregistered",
    ServiceUpdate => "serviceupdate",
    Terminated => "terminated",
    Probe => "probe",
    StreamError => "stream_error",
    Subscribe => "subscribe",
    Subscribed => "subscribed",
    Unsubscribe => "unsubscribe",
    Unsubscribed => "unsubscribed",
    PrivateData => "privatedata",
    ContactUpdated => "contactupdated",
    ContactUpdateFailure => "contactupdatefailure",
    DebugLog => "debug_log",
}

impl EventName {
    /// The `message_<type>` event for a message type. Unknown types are
    /// treated as `normal`.
    pub fn for_message_type(type_: &str) -> EventName {
        match type_ {
            "chat" => EventName::MessageChat,
            "groupchat" => EventName::MessageGroupchat,
            "headline" => EventName::MessageHeadline,
            _ => EventName::MessageNormal,
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

/// A name outside the event catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEvent(pub String);

impl fmt::Display for UnknownEvent {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "unknown event name: {}", self.0)
    }
}

impl std::error::Error for UnknownEvent {}

/// A received message, flattened.
#[derive(Debug, Clone)]
pub struct MessagePayload {
    /// Sender.
    pub from: Option<Jid>,
    /// Recipient.
    pub to: Option<Jid>,
    /// `type` attribute, `normal` when absent.
    pub type_: String,
    /// `<body/>` text.
    pub body: Option<String>,
    /// `<subject/>` text.
    pub subject: Option<String>,
    /// `<thread/>` text.
    pub thread: Option<String>,
    /// Stanza id.
    pub id: Option<String>,
    /// When it was received and when it claims to have been sent.
    pub time: StanzaTimeInfo,
    /// The whole stanza, for payloads not extracted above.
    pub stanza: Stanza,
}

/// A received presence, flattened.
#[derive(Debug, Clone)]
pub struct PresencePayload {
    /// Sender.
    pub from: Option<Jid>,
    /// `type` attribute; `None` means available.
    pub type_: Option<String>,
    /// `<show/>` text.
    pub show: Option<String>,
    /// `<status/>` text.
    pub status: Option<String>,
    /// `<priority/>`, 0 when absent or invalid.
    pub priority: i8,
    /// The whole stanza.
    pub stanza: Stanza,
}

/// What an event carries.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Nothing, e.g. `heartbeat`.
    None,
    /// `message_*` and `msgevent_*`.
    Message(MessagePayload),
    /// Presence events.
    Presence(PresencePayload),
    /// Roster results and pushes.
    Roster(Vec<RosterItem>),
    /// A raw stanza, e.g. `privatedata` or a tracked IQ result.
    Stanza(Stanza),
    /// `error`, `authfailure` and the `*failure` events.
    Error(ErrorInfo),
    /// `debug_log`.
    Log {
        /// Severity.
        level: Level,
        /// The log line.
        message: String,
    },
}

/// An event handed to handlers.
#[derive(Debug, Clone)]
pub struct Event {
    name: EventName,
    payload: Payload,
}

impl Event {
    /// An event without payload.
    pub fn new(name: EventName) -> Event {
        Event {
            name,
            payload: Payload::None,
        }
    }

    /// An event with payload.
    pub fn with_payload(name: EventName, payload: Payload) -> Event {
        Event { name, payload }
    }

    /// An error-carrying event.
    pub fn failure(name: EventName, info: ErrorInfo) -> Event {
        Event::with_payload(name, Payload::Error(info))
    }

    /// A `debug_log` event.
    pub fn log(level: Level, message: String) -> Event {
        Event::with_payload(EventName::DebugLog, Payload::Log { level, message })
    }

    /// The event name.
    pub fn name(&self) -> EventName {
        self.name
    }

    /// The payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The message, for message events.
    pub fn message(&self) -> Option<&MessagePayload> {
        match &self.payload {
            Payload::Message(message) => Some(message),
            _ => None,
        }
    }

    /// The presence, for presence events.
    pub fn presence(&self) -> Option<&PresencePayload> {
        match &self.payload {
            Payload::Presence(presence) => Some(presence),
            _ => None,
        }
    }

    /// The roster items, for roster events.
    pub fn roster(&self) -> Option<&[RosterItem]> {
        match &self.payload {
            Payload::Roster(items) => Some(items),
            _ => None,
        }
    }

    /// The error, for failure events.
    pub fn error(&self) -> Option<&ErrorInfo> {
        match &self.payload {
            Payload::Error(info) => Some(info),
            _ => None,
        }
    }

    /// The stanza the event was raised for, if any.
    pub fn stanza(&self) -> Option<&Stanza> {
        match &self.payload {
            Payload::Message(message) => Some(&message.stanza),
            Payload::Presence(presence) => Some(&presence.stanza),
            Payload::Stanza(stanza) => Some(stanza),
            Payload::Error(info) => info.stanza.as_ref(),
            Payload::None | Payload::Roster(_) | Payload::Log { .. } => None,
        }
    }
}
