// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Event-driven Jabber bots.
//!
//! A [`Session`] connects, negotiates and then turns every incoming stanza
//! into named [`Event`]s, which are handed to the handlers registered for
//! them. Handlers answer by queueing [`Actions`]. [`SimpleBot`] adds the
//! usual wiring on top: log in when connected, announce presence when
//! logged in.

#![deny(bare_trait_objects)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub use tokio_jabber;
pub use tokio_jabber::{BareJid, Jid, Stanza};

#[macro_use]
extern crate log;

pub mod actions;
pub mod bot;
mod classify;
pub mod config;
pub mod delay;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod iq;
pub mod roster;
pub mod session;

pub use actions::{Action, Actions};
pub use bot::SimpleBot;
pub use config::{Config, ConfigBuilder, RunFor};
pub use dispatcher::{Dispatcher, Handler, HandlerResult};
pub use error::{Error, ErrorInfo, ErrorKind};
pub use event::{Event, EventName, Payload};
pub use roster::RosterItem;
pub use session::{DisconnectHandle, Session, SessionState};
