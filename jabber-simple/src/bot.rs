// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A ready-made bot: log in on connect, announce presence, then run the
//! user's handlers.

use std::collections::HashMap;

use tokio_jabber::connect::{ServerConnector, TcpServerConnector};

use crate::actions::Actions;
use crate::config::Config;
use crate::dispatcher::{Handler, HandlerResult};
use crate::error::Error;
use crate::event::{Event, EventName, Payload};
use crate::session::Session;

/// Status announced once logged in.
pub const DEFAULT_STATUS: &str = "At your Service";

/// A [`Session`] with the usual bot wiring.
///
/// ```no_run
/// use jabber_simple::{Config, EventName, SimpleBot};
///
/// let config = Config::builder("example.org", "bot", "pencil").build();
/// let mut bot = SimpleBot::new(config).handler(EventName::MessageChat, |event, actions| {
///     if let Some(message) = event.message() {
///         actions.reply(message, "Hello!");
///     }
///     Ok(())
/// });
/// bot.run_blocking().unwrap();
/// ```
#[derive(Debug)]
pub struct SimpleBot<C: ServerConnector = TcpServerConnector> {
    session: Session<C>,
}

impl SimpleBot<TcpServerConnector> {
    /// A bot connecting over TCP.
    pub fn new(config: Config) -> SimpleBot<TcpServerConnector> {
        SimpleBot::from_session(Session::new(config))
    }

    /// A bot with handlers given up front.
    pub fn with_handlers(
        config: Config,
        handlers: HashMap<EventName, Handler>,
    ) -> SimpleBot<TcpServerConnector> {
        let mut bot = SimpleBot::new(config);
        for (name, handler) in handlers {
            bot.session.dispatcher_mut().register_boxed(name, handler);
        }
        bot
    }
}

impl<C: ServerConnector> SimpleBot<C> {
    /// Wrap a session and install the default handlers.
    pub fn from_session(mut session: Session<C>) -> SimpleBot<C> {
        session.set_handler(EventName::Connected, |_, actions| {
            actions.login();
            Ok(())
        });
        session.set_handler(EventName::Authenticated, |_, actions| {
            actions.set_presence("", DEFAULT_STATUS);
            Ok(())
        });
        let debug = session.config().debug;
        session.set_handler(EventName::DebugLog, move |event, _| {
            if let (true, Payload::Log { level, message }) = (debug, event.payload()) {
                println!("DEBUG({}): {}", level, message);
            }
            Ok(())
        });
        SimpleBot { session }
    }

    /// Add a handler for `name`.
    pub fn handler<F>(mut self, name: EventName, handler: F) -> Self
    where
        F: FnMut(&Event, &mut Actions) -> HandlerResult + Send + 'static,
    {
        self.session.set_handler(name, handler);
        self
    }

    /// The underlying session.
    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    /// The underlying session, e.g. to send from outside a handler.
    pub fn session_mut(&mut self) -> &mut Session<C> {
        &mut self.session
    }

    /// Connect, run for the configured time, then disconnect. Fails if the
    /// session cannot be established.
    pub async fn run(&mut self) -> Result<(), Error> {
        self.session.connect().await?;
        let freq = self.session.config().callback_freq;
        let runfor = self.session.config().runfor;
        let result = self.session.execute(freq, runfor).await;
        self.session.disconnect().await;
        result
    }

    /// [`run`][Self::run] on a runtime of its own.
    pub fn run_blocking(&mut self) -> Result<(), Error> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;
        runtime.block_on(self.run())
    }
}
