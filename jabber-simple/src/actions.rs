// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Commands handlers queue for the session.
//!
//! Handlers run synchronously and cannot touch the session while it is
//! dispatching. Instead they record what should happen next on the
//! [`Actions`] they are handed; the session performs the queue in order once
//! the handler returns.

use tokio_jabber::{Jid, Stanza};

use crate::event::EventName;
use crate::roster::RosterItem;

/// One queued command.
#[derive(Debug, Clone)]
pub enum Action {
    /// Authenticate on the open stream.
    Login,
    /// Broadcast presence.
    SetPresence {
        /// `<show/>`, empty for plain available
        show: String,
        /// `<status/>`
        status: String,
    },
    /// Send a message.
    SendMessage {
        /// Recipient
        to: Jid,
        /// `chat`, `groupchat`, `headline` or `normal`
        type_: String,
        /// Body text
        body: String,
    },
    /// Send any stanza.
    SendStanza(Stanza),
    /// Send an IQ and report its outcome through the given events.
    SendTrackedIq {
        /// The request
        iq: Stanza,
        /// Fired on `result`
        success: EventName,
        /// Fired on `error`
        failure: EventName,
    },
    /// Fetch the roster.
    RequestRoster,
    /// Add a contact.
    RosterAdd(RosterItem),
    /// Change a contact's name or groups.
    RosterUpdate(RosterItem),
    /// Remove a contact.
    RosterRemove(Jid),
    /// Close the stream and stop the session.
    Disconnect,
}

/// The queue a handler fills.
#[derive(Debug, Default)]
pub struct Actions {
    queue: Vec<Action>,
}

impl Actions {
    /// An empty queue.
    pub fn new() -> Actions {
        Actions::default()
    }

    /// Queue an arbitrary action.
    pub fn push(&mut self, action: Action) -> &mut Actions {
        self.queue.push(action);
        self
    }

    /// Authenticate with the configured credentials.
    pub fn login(&mut self) -> &mut Actions {
        self.push(Action::Login)
    }

    /// Broadcast presence.
    pub fn set_presence(&mut self, show: &str, status: &str) -> &mut Actions {
        self.push(Action::SetPresence {
            show: show.to_owned(),
            status: status.to_owned(),
        })
    }

    /// Send a message.
    pub fn send_message(&mut self, to: Jid, type_: &str, body: &str) -> &mut Actions {
        self.push(Action::SendMessage {
            to,
            type_: type_.to_owned(),
            body: body.to_owned(),
        })
    }

    /// Reply to a received message in kind.
    pub fn reply(&mut self, to: &crate::event::MessagePayload, body: &str) -> &mut Actions {
        match &to.from {
            Some(from) => {
                let from = if to.type_ == "groupchat" {
                    Jid::from(from.to_bare())
                } else {
                    from.clone()
                };
                self.send_message(from, &to.type_, body)
            }
            None => {
                debug!("Not replying to a message without sender");
                self
            }
        }
    }

    /// Send any stanza.
    pub fn send_stanza(&mut self, stanza: Stanza) -> &mut Actions {
        self.push(Action::SendStanza(stanza))
    }

    /// Send an IQ and report its outcome through `success` or `failure`.
    pub fn send_tracked_iq(
        &mut self,
        iq: Stanza,
        success: EventName,
        failure: EventName,
    ) -> &mut Actions {
        self.push(Action::SendTrackedIq {
            iq,
            success,
            failure,
        })
    }

    /// Fetch the roster; the result arrives as `rosterupdate`.
    pub fn request_roster(&mut self) -> &mut Actions {
        self.push(Action::RequestRoster)
    }

    /// Add a contact; reported as `rosteradded` or `rosteraddfailure`.
    pub fn roster_add(&mut self, item: RosterItem) -> &mut Actions {
        self.push(Action::RosterAdd(item))
    }

    /// Update a contact; reported as `rosterupdate` or `error`.
    pub fn roster_update(&mut self, item: RosterItem) -> &mut Actions {
        self.push(Action::RosterUpdate(item))
    }

    /// Remove a contact; reported as `rosterremoved` or
    /// `rosterremovefailure`.
    pub fn roster_remove(&mut self, jid: Jid) -> &mut Actions {
        self.push(Action::RosterRemove(jid))
    }

    /// Stop the session once the current handler returns.
    pub fn disconnect(&mut self) -> &mut Actions {
        self.push(Action::Disconnect)
    }

    /// Whether nothing was queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of queued actions.
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

impl IntoIterator for Actions {
    type Item = Action;
    type IntoIter = std::vec::IntoIter<Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.queue.into_iter()
    }
}
