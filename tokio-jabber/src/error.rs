// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use sasl::client::MechanismError as SaslMechanismError;
use std::error::Error as StdError;
use std::fmt;
use std::io;

use xmpp_parsers::jid::Error as JidParseError;

use crate::connect::StartTlsError;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// The server could not be reached
    Connect(ConnectError),
    /// The stream handshake failed
    Negotiation(NegotiationError),
    /// The established stream broke
    Io(IoError),
    /// Error parsing Jabber-Id
    JidParse(JidParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Connect(e) => write!(fmt, "connection error: {}", e),
            Error::Negotiation(e) => write!(fmt, "negotiation error: {}", e),
            Error::Io(e) => write!(fmt, "stream error: {}", e),
            Error::JidParse(e) => write!(fmt, "jid parse error: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Connect(e) => Some(e),
            Error::Negotiation(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::JidParse(e) => Some(e),
        }
    }
}

impl From<ConnectError> for Error {
    fn from(e: ConnectError) -> Self {
        Error::Connect(e)
    }
}

impl From<NegotiationError> for Error {
    fn from(e: NegotiationError) -> Self {
        Error::Negotiation(e)
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Io(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError::from_io(e))
    }
}

impl From<JidParseError> for Error {
    fn from(e: JidParseError) -> Self {
        Error::JidParse(e)
    }
}

/// Failure to establish the transport.
#[derive(Debug)]
pub enum ConnectError {
    /// Name resolution failed or yielded no address
    DnsFailure(String),
    /// Every resolved address refused the connection
    RefusedConnection(io::Error),
    /// The connection did not complete within the connect timeout
    Timeout,
    /// Any other socket error
    Io(io::Error),
}

impl ConnectError {
    /// Classify a socket error from `connect()`.
    pub fn from_io(e: io::Error) -> ConnectError {
        match e.kind() {
            io::ErrorKind::ConnectionRefused => ConnectError::RefusedConnection(e),
            io::ErrorKind::TimedOut => ConnectError::Timeout,
            _ => ConnectError::Io(e),
        }
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectError::DnsFailure(e) => write!(fmt, "DNS resolution failed: {}", e),
            ConnectError::RefusedConnection(e) => write!(fmt, "connection refused: {}", e),
            ConnectError::Timeout => write!(fmt, "connection timed out"),
            ConnectError::Io(e) => write!(fmt, "IO error: {}", e),
        }
    }
}

impl StdError for ConnectError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConnectError::RefusedConnection(e) | ConnectError::Io(e) => Some(e),
            ConnectError::DnsFailure(_) | ConnectError::Timeout => None,
        }
    }
}

#[cfg(feature = "dns")]
impl From<hickory_resolver::error::ResolveError> for ConnectError {
    fn from(e: hickory_resolver::error::ResolveError) -> Self {
        ConnectError::DnsFailure(e.to_string())
    }
}

#[cfg(feature = "dns")]
impl From<hickory_resolver::proto::error::ProtoError> for ConnectError {
    fn from(e: hickory_resolver::proto::error::ProtoError) -> Self {
        ConnectError::DnsFailure(e.to_string())
    }
}

#[cfg(feature = "dns")]
impl From<idna::Errors> for ConnectError {
    fn from(_e: idna::Errors) -> Self {
        ConnectError::DnsFailure("IDNA conversion failed".to_owned())
    }
}

/// Failure of an established stream.
#[derive(Debug)]
pub enum IoError {
    /// The peer closed the stream, either with a footer or by closing the
    /// socket
    Closed,
    /// The connection broke: socket error or XML which is not well-formed
    Reset(io::Error),
}

impl IoError {
    /// Classify an error surfaced while reading or writing the stream.
    pub fn from_io(e: io::Error) -> IoError {
        let eof = matches!(
            e.get_ref().and_then(|inner| inner.downcast_ref::<rxml::Error>()),
            Some(rxml::Error::InvalidEof(_))
        );
        if eof || e.kind() == io::ErrorKind::UnexpectedEof {
            IoError::Closed
        } else {
            IoError::Reset(e)
        }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IoError::Closed => write!(fmt, "stream closed"),
            IoError::Reset(e) => write!(fmt, "connection reset: {}", e),
        }
    }
}

impl StdError for IoError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            IoError::Closed => None,
            IoError::Reset(e) => Some(e),
        }
    }
}

impl From<io::Error> for IoError {
    fn from(e: io::Error) -> Self {
        IoError::from_io(e)
    }
}

/// Failure during the stream handshake.
#[derive(Debug)]
pub enum NegotiationError {
    /// The server sent something which has no place at this step; carries
    /// the element name
    UnexpectedStanza(String),
    /// The server rejected our credentials
    AuthRejected {
        /// Defined condition of the `<failure/>`, e.g. `not-authorized`
        condition: String,
        /// Optional human readable text sent along
        text: Option<String>,
    },
    /// The stream ended during negotiation
    StreamClosed,
    /// None of our preferred SASL mechanisms is offered
    NoMechanism,
    /// TLS is required but could not be negotiated
    TlsRequired,
    /// The TLS upgrade failed
    Tls(StartTlsError),
    /// Local SASL implementation error
    Sasl(SaslMechanismError),
    /// Resource binding or session establishment failed
    BindFailed(String),
    /// Socket or XML error
    Io(io::Error),
}

impl fmt::Display for NegotiationError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NegotiationError::UnexpectedStanza(name) => {
                write!(fmt, "unexpected <{}/> during negotiation", name)
            }
            NegotiationError::AuthRejected {
                condition,
                text: Some(text),
            } => write!(fmt, "authentication rejected: {} ({})", condition, text),
            NegotiationError::AuthRejected {
                condition,
                text: None,
            } => write!(fmt, "authentication rejected: {}", condition),
            NegotiationError::StreamClosed => write!(fmt, "stream closed during negotiation"),
            NegotiationError::NoMechanism => write!(fmt, "no matching SASL mechanism available"),
            NegotiationError::TlsRequired => write!(fmt, "TLS required but not available"),
            NegotiationError::Tls(e) => write!(fmt, "{}", e),
            NegotiationError::Sasl(e) => write!(fmt, "local SASL implementation error: {}", e),
            NegotiationError::BindFailed(e) => write!(fmt, "resource binding failed: {}", e),
            NegotiationError::Io(e) => write!(fmt, "IO error: {}", e),
        }
    }
}

impl StdError for NegotiationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            NegotiationError::Tls(e) => Some(e),
            NegotiationError::Sasl(e) => Some(e),
            NegotiationError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for NegotiationError {
    fn from(e: io::Error) -> Self {
        match IoError::from_io(e) {
            IoError::Closed => NegotiationError::StreamClosed,
            IoError::Reset(e) => NegotiationError::Io(e),
        }
    }
}

impl From<IoError> for NegotiationError {
    fn from(e: IoError) -> Self {
        match e {
            IoError::Closed => NegotiationError::StreamClosed,
            IoError::Reset(e) => NegotiationError::Io(e),
        }
    }
}

impl From<StartTlsError> for NegotiationError {
    fn from(e: StartTlsError) -> Self {
        NegotiationError::Tls(e)
    }
}

impl From<SaslMechanismError> for NegotiationError {
    fn from(e: SaslMechanismError) -> Self {
        NegotiationError::Sasl(e)
    }
}
