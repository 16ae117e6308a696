// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::HashMap;

use log::Level;
use tokio_jabber::logging::Logger;
use tokio_jabber::{log_to, Jid};

use crate::event::EventName;

/// Events reporting the outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IqOutcome {
    /// Fired for a `result` reply.
    pub success: EventName,
    /// Fired for an `error` reply.
    pub failure: EventName,
}

type IqKey = (Option<Jid>, String);

/// Utility struct to track IQ responses.
///
/// Requests are keyed by recipient and id. A request without recipient is
/// addressed to our own account, whose server may answer from the bare JID,
/// the domain or without `from` at all.
#[derive(Debug, Default)]
pub struct IqTracker {
    map: HashMap<IqKey, IqOutcome>,
    own: Option<Jid>,
    logger: Logger,
}

impl IqTracker {
    /// Create a new empty response tracker.
    pub fn new() -> IqTracker {
        IqTracker::default()
    }

    pub(crate) fn set_logger(&mut self, logger: Logger) {
        self.logger = logger;
    }

    /// Set the JID we are bound to.
    pub fn set_own_jid(&mut self, jid: Option<Jid>) {
        self.own = jid;
    }

    /// The JID we are bound to.
    pub fn own_jid(&self) -> Option<&Jid> {
        self.own.as_ref()
    }

    /// Whether `from` designates our own account or its server.
    pub fn is_own_account(&self, from: Option<&Jid>) -> bool {
        match (from, &self.own) {
            (None, _) => true,
            (Some(from), Some(own)) => {
                from.resource().is_none()
                    && (from.to_bare() == own.to_bare()
                        || (from.node().is_none() && from.domain() == own.domain()))
            }
            (Some(_), None) => false,
        }
    }

    /// Remember a request.
    pub fn track(&mut self, to: Option<Jid>, id: String, outcome: IqOutcome) {
        if self.map.insert((to, id), outcome).is_some() {
            log_to!(
                self.logger,
                Level::Warn,
                "Replaced a pending IQ with the same recipient and id"
            );
        }
    }

    /// Match a reply and forget its request.
    pub fn resolve(&mut self, from: Option<&Jid>, id: &str) -> Option<IqOutcome> {
        if let Some(outcome) = self.map.remove(&(from.cloned(), id.to_owned())) {
            return Some(outcome);
        }
        if self.is_own_account(from) {
            return self.map.remove(&(None, id.to_owned()));
        }
        log_to!(
            self.logger,
            Level::Trace,
            "not handling IQ response from {:?} with id {:?}: no active tracker for this tuple",
            from,
            id
        );
        None
    }

    /// Number of requests awaiting a reply.
    pub fn pending(&self) -> usize {
        self.map.len()
    }

    /// Forget every pending request.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROSTER_ADD: IqOutcome = IqOutcome {
        success: EventName::RosterAdded,
        failure: EventName::RosterAddFailure,
    };

    #[test]
    fn test_resolve_from_peer() {
        let mut tracker = IqTracker::new();
        let peer: Jid = "peer@example.org/x".parse().unwrap();
        tracker.track(Some(peer.clone()), String::from("1"), ROSTER_ADD);
        assert_eq!(tracker.resolve(None, "1"), None);
        assert_eq!(tracker.resolve(Some(&peer), "1"), Some(ROSTER_ADD));
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn test_resolve_own_account() {
        let mut tracker = IqTracker::new();
        tracker.set_own_jid(Some("bot@example.org/res".parse().unwrap()));
        tracker.track(None, String::from("a"), ROSTER_ADD);
        tracker.track(None, String::from("b"), ROSTER_ADD);
        tracker.track(None, String::from("c"), ROSTER_ADD);

        let stranger: Jid = "mallory@evil.example".parse().unwrap();
        assert_eq!(tracker.resolve(Some(&stranger), "a"), None);

        let other_resource: Jid = "bot@example.org/other".parse().unwrap();
        assert_eq!(tracker.resolve(Some(&other_resource), "a"), None);

        let bare: Jid = "Bot@Example.ORG".parse().unwrap();
        let domain: Jid = "example.org".parse().unwrap();
        assert_eq!(tracker.resolve(Some(&bare), "a"), Some(ROSTER_ADD));
        assert_eq!(tracker.resolve(Some(&domain), "b"), Some(ROSTER_ADD));
        assert_eq!(tracker.resolve(None, "c"), Some(ROSTER_ADD));
        assert_eq!(tracker.resolve(None, "c"), None);
    }

    #[test]
    fn test_jid_validation() {
        assert!("jul iet@example.com".parse::<Jid>().is_err());
        let long_node = format!("{}@example.org", "n".repeat(2000));
        assert!(long_node.parse::<Jid>().is_err());
        let mixed: Jid = "Juliet@Example.COM".parse().unwrap();
        let lower: Jid = "juliet@example.com".parse().unwrap();
        assert_eq!(mixed, lower);
    }
}
