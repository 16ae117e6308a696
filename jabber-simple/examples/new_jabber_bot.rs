// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::env::args;
use std::process::exit;

use jabber_simple::{Config, EventName, Jid, SimpleBot};

fn main() {
    env_logger::init();

    let args: Vec<String> = args().collect();
    if args.len() != 4 {
        println!("Usage: {} <jid-or-username> <server> <password>", args[0]);
        exit(1);
    }

    // A JID with a node overrides the server argument.
    let jid: Jid = match args[1].parse() {
        Ok(jid) => jid,
        Err(e) => {
            println!("Invalid JID or username {:?}: {}", args[1], e);
            exit(1);
        }
    };
    let mut builder = match jid.node() {
        Some(node) => Config::builder(jid.domain().as_str(), node.as_str(), args[3].as_str()),
        None => Config::builder(args[2].as_str(), jid.domain().as_str(), args[3].as_str()),
    };
    if let Some(resource) = jid.resource() {
        builder = builder.resource(resource.as_str());
    }
    let config = builder.debug(true).build();

    let mut bot = SimpleBot::new(config)
        .handler(EventName::MessageChat, |event, actions| {
            if let Some(message) = event.message() {
                let body = message.body.as_deref().unwrap_or_default();
                log::info!(
                    "{} {}: {}",
                    message.time.received.time().format("%H:%M"),
                    message.from.as_ref().map(|jid| jid.to_string()).unwrap_or_default(),
                    body
                );
                actions.reply(message, &format!("You said: {}", body));
            }
            Ok(())
        })
        .handler(EventName::Heartbeat, |_, _| {
            log::trace!("Heartbeat");
            Ok(())
        });

    if let Err(e) = bot.run_blocking() {
        log::error!("Session failed: {}", e);
        exit(1);
    }
}
