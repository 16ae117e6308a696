// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `jabber:iq:roster` items.

use tokio_jabber::minidom::Element;
use tokio_jabber::ns;
use tokio_jabber::parsers::roster::{Ask, Group, Item, Roster, Subscription};
use tokio_jabber::BareJid;

/// One contact of the roster.
pub type RosterItem = Item;

/// A new item, as sent when adding or updating a contact.
pub fn item(jid: BareJid, name: Option<&str>, groups: &[&str]) -> RosterItem {
    Item {
        jid,
        name: name.map(str::to_owned),
        subscription: Subscription::None,
        ask: Ask::None,
        groups: groups.iter().map(|g| Group((*g).to_owned())).collect(),
    }
}

/// The items of a roster `<query/>`. Invalid items, e.g. with a malformed
/// JID, are skipped.
pub fn parse_query(query: &Element) -> Vec<RosterItem> {
    query
        .children()
        .filter(|child| child.is("item", ns::ROSTER))
        .filter_map(|child| match Item::try_from(child.clone()) {
            Ok(item) => Some(item),
            Err(e) => {
                debug!("Skipping roster item {:?}: {}", child.attr("jid"), e);
                None
            }
        })
        .collect()
}

/// An empty roster query, for fetching the roster.
pub fn query() -> Element {
    Roster {
        ver: None,
        items: Vec::new(),
    }
    .into()
}

/// A roster query holding a single item.
pub fn query_with(item: &RosterItem) -> Element {
    Roster {
        ver: None,
        items: vec![item.clone()],
    }
    .into()
}

/// A query removing `jid` from the roster.
pub fn removal(jid: BareJid) -> Element {
    let item = Item {
        subscription: Subscription::Remove,
        ..item(jid, None, &[])
    };
    query_with(&item)
}
