// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! XML namespaces used on a client stream.

/// Default namespace of client streams.
pub const JABBER_CLIENT: &str = "jabber:client";

/// The `stream:` prefix namespace.
pub const STREAM: &str = "http://etherx.jabber.org/streams";

/// STARTTLS negotiation.
pub const TLS: &str = "urn:ietf:params:xml:ns:xmpp-tls";

/// SASL negotiation.
pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";

/// Resource binding.
pub const BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";

/// Legacy session establishment.
pub const SESSION: &str = "urn:ietf:params:xml:ns:xmpp-session";

/// Stream error conditions.
pub const XMPP_STREAMS: &str = "urn:ietf:params:xml:ns:xmpp-streams";

/// Stanza error conditions.
pub const XMPP_STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";

/// Roster management.
pub const ROSTER: &str = "jabber:iq:roster";

/// Private XML storage.
pub const PRIVATE: &str = "jabber:iq:private";

/// Legacy message events.
pub const EVENT: &str = "jabber:x:event";

/// Chat state notifications.
pub const CHATSTATES: &str = "http://jabber.org/protocol/chatstates";

/// Delayed delivery.
pub const DELAY: &str = "urn:xmpp:delay";

/// Legacy delayed delivery.
pub const LEGACY_DELAY: &str = "jabber:x:delay";
