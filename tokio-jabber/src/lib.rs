// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Low-level Jabber client streams with asynchronous I/O using
//! [tokio](https://tokio.rs/).
//!
//! For an event-driven bot interface, try the `jabber-simple` crate.
//!
//! # Getting started
//!
//! A [`connect::ServerConnector`] produces a [`Connection`]. A
//! [`negotiation::Negotiator`] then opens an XML stream over it, upgrades
//! it with STARTTLS, authenticates with SASL and binds a resource. The
//! resulting [`xmlstream::XmlStream`] yields top-level elements which
//! [`Stanza`] classifies.
//!
//! ```no_run
//! use futures::StreamExt;
//! use tokio_jabber::connect::{DnsConfig, TcpServerConnector};
//! use tokio_jabber::negotiation::{client_login, NegotiationConfig};
//! use tokio_jabber::Stanza;
//!
//! # async fn run() -> Result<(), tokio_jabber::Error> {
//! let server = TcpServerConnector::new(DnsConfig::srv_default_client("example.org"));
//! let config = NegotiationConfig::new("example.org", "bot", "secret");
//! let mut negotiated = client_login(&server, config).await?;
//! negotiated
//!     .stream
//!     .send_element(Stanza::presence("", "online").element())
//!     .await?;
//! while let Some(Ok(element)) = negotiated.stream.next().await {
//!     println!("<{}/>", element.name());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `dns` (default): SRV and hostname resolution with hickory.
//! - `tls-rust-native-certs` (default): trust the system certificate store.
//! - `tls-rust-webpki-roots`: trust the bundled Mozilla root certificates.

#![deny(unsafe_code, missing_docs, bare_trait_objects)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod connect;
pub mod connection;
pub mod logging;
pub mod negotiation;
pub mod ns;
pub mod stanza;
pub mod xmlstream;

/// Detailed error types
pub mod error;

pub use crate::connection::{Connection, TlsState};
#[doc(inline)]
/// Generic tokio_jabber Error
pub use crate::error::Error;
pub use crate::stanza::Stanza;

// Re-exports
pub use jid::{BareJid, FullJid, Jid};
pub use minidom;
pub use xmpp_parsers as parsers;
pub use jid;
