// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use tokio_jabber::minidom::Element;
use tokio_jabber::ns;
use tokio_jabber::parsers::delay::Delay;

/// Time information associated with a stanza.
///
/// Contains information about when the message was received, and any claim
/// about when it was sent.
#[derive(Debug, Clone)]
pub struct StanzaTimeInfo {
    /// Time information when the message was received by the library
    pub received: DateTime<Utc>,

    /// Sending time claimed by `urn:xmpp:delay` or legacy `jabber:x:delay`
    /// payloads, in document order.
    ///
    /// Only trust these when the sender is trusted: servers stamp offline
    /// messages, but any entity can add a delay.
    pub delays: Vec<DateTime<FixedOffset>>,
}

impl StanzaTimeInfo {
    /// Collect the delays of `stanza`, received now.
    pub fn now(stanza: &Element) -> StanzaTimeInfo {
        StanzaTimeInfo {
            received: Utc::now(),
            delays: stanza.children().filter_map(parse_delay).collect(),
        }
    }

    /// The earliest claimed sending time, or the reception time.
    pub fn sent(&self) -> DateTime<FixedOffset> {
        self.delays
            .iter()
            .min()
            .cloned()
            .unwrap_or_else(|| self.received.fixed_offset())
    }

    /// Whether the stanza was delayed, e.g. stored offline.
    pub fn is_delayed(&self) -> bool {
        !self.delays.is_empty()
    }
}

fn parse_delay(child: &Element) -> Option<DateTime<FixedOffset>> {
    if child.is("delay", ns::DELAY) {
        return match Delay::try_from(child.clone()) {
            Ok(delay) => Some(delay.stamp.0),
            Err(e) => {
                debug!("Ignoring invalid delay: {}", e);
                None
            }
        };
    }
    if child.is("x", ns::LEGACY_DELAY) {
        let stamp = child.attr("stamp")?;
        // CCYYMMDDThh:mm:ss, always UTC
        return NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc().fixed_offset());
    }
    None
}
