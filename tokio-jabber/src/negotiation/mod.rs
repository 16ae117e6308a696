// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Client side of stream negotiation.
//!
//! The [`Negotiator`] drives a fresh [`Connection`] through
//!
//! ```text
//! Connecting -> StreamOpened -> (TlsNegotiating) -> SaslNegotiating
//!            -> ResourceBinding -> Authenticated
//! ```
//!
//! and ends up in `Terminated` on the first failure. The handshake is split
//! in two halves: [`Negotiator::open`] opens and secures the stream,
//! [`Negotiator::authenticate`] logs in and binds a resource.

use futures::StreamExt;
use log::Level;
use minidom::Element;
use xmpp_parsers::jid::{BareJid, Jid};
use xmpp_parsers::stream_features::StreamFeatures;

use crate::connect::ServerConnector;
use crate::connection::{Connection, TlsState};
use crate::error::{Error, NegotiationError};
use crate::log_to;
use crate::logging::Logger;
use crate::ns;
use crate::stanza::Stanza;
use crate::xmlstream::{StreamHeader, XmlStream};

mod auth;
mod bind;
mod starttls;

/// SASL mechanisms tried by default, most preferred first.
pub const DEFAULT_MECHANISMS: &[&str] = &["SCRAM-SHA-256", "SCRAM-SHA-1", "PLAIN"];

/// Whether STARTTLS is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsPolicy {
    /// Refuse to continue unless the stream is secured.
    #[default]
    Required,
    /// Upgrade when the server offers it.
    Optional,
    /// Never upgrade.
    Disabled,
}

/// Steps of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Nothing has been exchanged yet.
    Connecting,
    /// Headers are exchanged and features were received.
    StreamOpened,
    /// STARTTLS is in progress.
    TlsNegotiating,
    /// The SASL exchange is in progress.
    SaslNegotiating,
    /// Binding a resource on the restarted stream.
    ResourceBinding,
    /// The stream is ready for stanzas.
    Authenticated,
    /// The handshake failed. Final.
    Terminated,
}

/// What to negotiate.
#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    /// Domain of the account, sent as `to` in the stream header.
    pub domain: String,
    /// Account name; required by every mechanism but ANONYMOUS.
    pub username: Option<String>,
    /// Account password.
    pub password: String,
    /// Resource to request. The server may assign another.
    pub resource: Option<String>,
    /// STARTTLS policy.
    pub tls: TlsPolicy,
    /// SASL mechanism names, most preferred first.
    pub preferred_mechanisms: Vec<String>,
}

impl NegotiationConfig {
    /// Configuration with the default TLS policy and mechanisms.
    pub fn new(domain: &str, username: &str, password: &str) -> NegotiationConfig {
        NegotiationConfig {
            domain: domain.to_owned(),
            username: Some(username.to_owned()),
            password: password.to_owned(),
            resource: None,
            tls: TlsPolicy::default(),
            preferred_mechanisms: DEFAULT_MECHANISMS.iter().map(|m| (*m).to_owned()).collect(),
        }
    }

    /// The account JID without resource.
    pub fn bare_jid(&self) -> Result<BareJid, xmpp_parsers::jid::Error> {
        match &self.username {
            Some(username) => BareJid::new(&format!("{}@{}", username, self.domain)),
            None => BareJid::new(&self.domain),
        }
    }
}

/// A stream which is open, and secured if the policy asked for it, but
/// not authenticated yet.
#[derive(Debug)]
pub struct OpenStream {
    stream: XmlStream,
    header: StreamHeader,
    features: StreamFeatures,
}

impl OpenStream {
    /// Stream features offered on the current stream.
    pub fn features(&self) -> &StreamFeatures {
        &self.features
    }

    /// The server's stream header.
    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// The stream itself, e.g. to read stanzas before authenticating.
    pub fn stream_mut(&mut self) -> &mut XmlStream {
        &mut self.stream
    }

    /// Give up on authenticating and take the stream back.
    pub fn into_stream(self) -> XmlStream {
        self.stream
    }
}

/// A stream ready for stanzas.
#[derive(Debug)]
pub struct Negotiated {
    /// The stream.
    pub stream: XmlStream,
    /// The full JID the server bound us to.
    pub jid: Jid,
    /// `id` of the final stream header.
    pub stream_id: Option<String>,
    /// The SASL mechanism that succeeded.
    pub mechanism: String,
}

/// Read the next top-level element of a stream under negotiation.
pub(crate) async fn next_element(stream: &mut XmlStream) -> Result<Element, NegotiationError> {
    match stream.next().await {
        Some(Ok(element)) => {
            if element.is("error", ns::STREAM) {
                let error = Stanza::StreamError(element);
                log_to!(
                    stream.logger(),
                    Level::Warn,
                    "Stream error during negotiation: {}",
                    error
                        .error_condition()
                        .as_deref()
                        .unwrap_or("undefined-condition")
                );
                return Err(NegotiationError::StreamClosed);
            }
            Ok(element)
        }
        Some(Err(e)) => Err(e.into()),
        None => Err(NegotiationError::StreamClosed),
    }
}

async fn recv_features(stream: &mut XmlStream) -> Result<StreamFeatures, NegotiationError> {
    let element = next_element(stream).await?;
    if !element.is("features", ns::STREAM) {
        return Err(NegotiationError::UnexpectedStanza(element.name().to_owned()));
    }
    match StreamFeatures::try_from(element) {
        Ok(features) => Ok(features),
        Err(e) => {
            log_to!(stream.logger(), Level::Debug, "Invalid stream features: {}", e);
            Err(NegotiationError::UnexpectedStanza(String::from("features")))
        }
    }
}

/// Drives the handshake and records how far it got.
#[derive(Debug)]
pub struct Negotiator {
    config: NegotiationConfig,
    state: NegotiationState,
    logger: Logger,
}

impl Negotiator {
    /// Negotiator for the given configuration.
    pub fn new(config: NegotiationConfig) -> Negotiator {
        Negotiator {
            config,
            state: NegotiationState::Connecting,
            logger: Logger::default(),
        }
    }

    /// Also hand every line logged during the handshake, and afterwards on
    /// the negotiated stream, to `logger`.
    pub fn with_logger(mut self, logger: Logger) -> Negotiator {
        self.logger = logger;
        self
    }

    /// The configuration.
    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// How far the handshake got.
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    fn enter(&mut self, state: NegotiationState) {
        log_to!(self.logger, Level::Debug, "Negotiation: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn fail<T>(&mut self, result: Result<T, NegotiationError>) -> Result<T, NegotiationError> {
        if let Err(e) = &result {
            log_to!(self.logger, Level::Debug, "Negotiation failed in {:?}: {}", self.state, e);
            self.enter(NegotiationState::Terminated);
        }
        result
    }

    /// Exchange stream headers and apply the TLS policy.
    pub async fn open(&mut self, connection: Connection) -> Result<OpenStream, NegotiationError> {
        let result = self.open_inner(connection).await;
        self.fail(result)
    }

    async fn open_inner(&mut self, connection: Connection) -> Result<OpenStream, NegotiationError> {
        if self.state != NegotiationState::Connecting {
            return Err(NegotiationError::StreamClosed);
        }
        let mut stream = XmlStream::new(connection, ns::JABBER_CLIENT);
        if self.logger.has_sink() {
            stream.set_logger(self.logger.clone());
        }
        let mut header = stream.initiate(&self.config.domain).await?;
        let mut features = recv_features(&mut stream).await?;
        self.enter(NegotiationState::StreamOpened);

        let server_requires = features
            .starttls
            .as_ref()
            .is_some_and(|tls| tls.required.is_some());
        let secured = stream.tls_state() == TlsState::Secured;
        match (self.config.tls, features.can_starttls()) {
            _ if secured => (),
            (TlsPolicy::Required, true) | (TlsPolicy::Optional, true) => {
                self.enter(NegotiationState::TlsNegotiating);
                starttls::starttls(&mut stream, &self.config.domain).await?;
                header = stream.initiate(&self.config.domain).await?;
                features = recv_features(&mut stream).await?;
                self.enter(NegotiationState::StreamOpened);
            }
            (TlsPolicy::Required, false) => return Err(NegotiationError::TlsRequired),
            (TlsPolicy::Disabled, true) if server_requires => {
                return Err(NegotiationError::TlsRequired)
            }
            (TlsPolicy::Optional, false) | (TlsPolicy::Disabled, _) => {
                log_to!(self.logger, Level::Debug, "Continuing without TLS");
            }
        }

        Ok(OpenStream {
            stream,
            header,
            features,
        })
    }

    /// Authenticate, restart the stream and bind a resource.
    pub async fn authenticate(&mut self, open: OpenStream) -> Result<Negotiated, NegotiationError> {
        let result = self.authenticate_inner(open).await;
        self.fail(result)
    }

    async fn authenticate_inner(
        &mut self,
        open: OpenStream,
    ) -> Result<Negotiated, NegotiationError> {
        if self.state != NegotiationState::StreamOpened {
            return Err(NegotiationError::StreamClosed);
        }
        let OpenStream {
            mut stream,
            features,
            ..
        } = open;

        self.enter(NegotiationState::SaslNegotiating);
        let mechanism = auth::select_mechanism(&features, &self.config, &self.logger)?;
        let mechanism_name = mechanism.name().to_owned();
        auth::authenticate(&mut stream, mechanism).await?;
        log_to!(self.logger, Level::Debug, "Authenticated with {}", mechanism_name);

        stream.reset();
        let header = stream.initiate(&self.config.domain).await?;
        let features = recv_features(&mut stream).await?;

        self.enter(NegotiationState::ResourceBinding);
        let bound = bind::bind(&mut stream, &features, self.config.resource.as_deref()).await?;
        let jid = match bound {
            Some(jid) => jid,
            None => self
                .config
                .bare_jid()
                .map(Jid::from)
                .map_err(|e| NegotiationError::BindFailed(e.to_string()))?,
        };
        bind::establish_session(&mut stream, &features).await?;

        self.enter(NegotiationState::Authenticated);
        Ok(Negotiated {
            stream,
            jid,
            stream_id: header.id,
            mechanism: mechanism_name,
        })
    }

    /// Run the whole handshake.
    pub async fn negotiate(&mut self, connection: Connection) -> Result<Negotiated, NegotiationError> {
        let open = self.open(connection).await?;
        self.authenticate(open).await
    }
}

/// Connect with `server` and log in as a client.
pub async fn client_login<C: ServerConnector>(
    server: &C,
    config: NegotiationConfig,
) -> Result<Negotiated, Error> {
    let connection = server.connect().await?;
    let mut negotiator = Negotiator::new(config);
    Ok(negotiator.negotiate(connection).await?)
}
