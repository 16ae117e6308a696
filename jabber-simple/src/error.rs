// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use core::fmt;
use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use tokio_jabber::error::{ConnectError, IoError, NegotiationError};
use tokio_jabber::jid::Error as JidError;
use tokio_jabber::Stanza;

use crate::event::EventName;
use crate::session::SessionState;

/// What a handler may fail with.
pub type HandlerError = Box<dyn StdError + Send + Sync>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Connecting, negotiating or talking to the server failed
    Jabber(tokio_jabber::Error),
    /// The operation needs a state the session is not in
    InvalidState {
        /// What was attempted
        operation: &'static str,
        /// Where the session was
        state: SessionState,
    },
    /// Logging in failed; the same error went out with `authfailure` or
    /// `error`
    Login(Arc<NegotiationError>),
    /// Invalid JID in the configuration or an argument
    Jid(JidError),
    /// The runtime for a blocking run could not be built
    Runtime(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Jabber(e) => write!(fmt, "{}", e),
            Error::InvalidState { operation, state } => {
                write!(fmt, "cannot {} while {:?}", operation, state)
            }
            Error::Login(e) => write!(fmt, "login failed: {}", e),
            Error::Jid(e) => write!(fmt, "invalid JID: {}", e),
            Error::Runtime(e) => write!(fmt, "runtime error: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Jabber(e) => Some(e),
            Error::InvalidState { .. } => None,
            Error::Login(e) => Some(&**e),
            Error::Jid(e) => Some(e),
            Error::Runtime(e) => Some(e),
        }
    }
}

impl From<tokio_jabber::Error> for Error {
    fn from(e: tokio_jabber::Error) -> Self {
        Error::Jabber(e)
    }
}

impl From<ConnectError> for Error {
    fn from(e: ConnectError) -> Self {
        Error::Jabber(e.into())
    }
}

impl From<NegotiationError> for Error {
    fn from(e: NegotiationError) -> Self {
        Error::Jabber(e.into())
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Jabber(e.into())
    }
}

impl From<JidError> for Error {
    fn from(e: JidError) -> Self {
        Error::Jid(e)
    }
}

/// Classification carried by every failure event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The server name could not be resolved
    DnsFailure,
    /// The server refused the connection
    RefusedConnection,
    /// Connecting took too long
    Timeout,
    /// The server rejected the credentials
    AuthRejected,
    /// The server sent something unexpected during negotiation
    UnexpectedStanza,
    /// The stream ended, during negotiation or afterwards
    StreamClosed,
    /// No usable SASL mechanism
    NoMechanism,
    /// TLS was required or failed
    Tls,
    /// Local SASL failure, e.g. a bad server signature
    Sasl,
    /// Resource binding or session establishment failed
    BindFailed,
    /// The connection broke
    Reset,
    /// A handler returned an error or panicked
    Callback,
    /// The server answered with an error stanza
    Stanza,
    /// The server sent a stream error
    StreamError,
    /// A stanza no event covers
    Unclassified,
}

impl ErrorKind {
    /// Kind of a connection or negotiation failure.
    pub fn of(error: &tokio_jabber::Error) -> ErrorKind {
        match error {
            tokio_jabber::Error::Connect(ConnectError::DnsFailure(_)) => ErrorKind::DnsFailure,
            tokio_jabber::Error::Connect(ConnectError::RefusedConnection(_)) => {
                ErrorKind::RefusedConnection
            }
            tokio_jabber::Error::Connect(ConnectError::Timeout) => ErrorKind::Timeout,
            tokio_jabber::Error::Connect(ConnectError::Io(_)) => ErrorKind::Reset,
            tokio_jabber::Error::Negotiation(e) => ErrorKind::of_negotiation(e),
            tokio_jabber::Error::Io(IoError::Closed) => ErrorKind::StreamClosed,
            tokio_jabber::Error::Io(IoError::Reset(_)) => ErrorKind::Reset,
            tokio_jabber::Error::JidParse(_) => ErrorKind::BindFailed,
        }
    }

    /// Kind of a negotiation failure.
    pub fn of_negotiation(error: &NegotiationError) -> ErrorKind {
        match error {
            NegotiationError::UnexpectedStanza(_) => ErrorKind::UnexpectedStanza,
            NegotiationError::AuthRejected { .. } => ErrorKind::AuthRejected,
            NegotiationError::StreamClosed => ErrorKind::StreamClosed,
            NegotiationError::NoMechanism => ErrorKind::NoMechanism,
            NegotiationError::TlsRequired | NegotiationError::Tls(_) => ErrorKind::Tls,
            NegotiationError::Sasl(_) => ErrorKind::Sasl,
            NegotiationError::BindFailed(_) => ErrorKind::BindFailed,
            NegotiationError::Io(_) => ErrorKind::Reset,
        }
    }
}

/// Payload of `error`, `authfailure` and the `*failure` events.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Human readable description.
    pub message: String,
    /// For [`ErrorKind::Callback`], the event whose handler failed.
    pub event: Option<EventName>,
    /// The offending or error stanza, if any.
    pub stanza: Option<Stanza>,
    /// The original error, e.g. what a handler returned. Downcast it to
    /// recover the concrete type.
    pub source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl ErrorInfo {
    /// Error info without stanza.
    pub fn new<M: Into<String>>(kind: ErrorKind, message: M) -> ErrorInfo {
        ErrorInfo {
            kind,
            message: message.into(),
            event: None,
            stanza: None,
            source: None,
        }
    }

    /// Attach the error this info describes.
    pub fn with_source(mut self, source: Arc<dyn StdError + Send + Sync>) -> ErrorInfo {
        self.source = Some(source);
        self
    }

    /// A failed handler of `event`.
    pub fn callback<M: Into<String>>(event: EventName, message: M) -> ErrorInfo {
        ErrorInfo {
            event: Some(event),
            ..ErrorInfo::new(ErrorKind::Callback, message)
        }
    }

    /// An error stanza or stream error, described by its condition.
    pub fn from_stanza(kind: ErrorKind, stanza: Stanza) -> ErrorInfo {
        let condition = stanza
            .error_condition()
            .unwrap_or_else(|| String::from("undefined-condition"));
        let message = match stanza.error_text() {
            Some(text) => format!("{} ({})", condition, text),
            None => condition,
        };
        ErrorInfo {
            stanza: Some(stanza),
            ..ErrorInfo::new(kind, message)
        }
    }

    /// Description of a connection or negotiation failure.
    pub fn from_error(error: &tokio_jabber::Error) -> ErrorInfo {
        ErrorInfo::new(ErrorKind::of(error), error.to_string())
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self.event {
            Some(event) => write!(fmt, "{:?} in {} handler: {}", self.kind, event, self.message),
            None => write!(fmt, "{:?}: {}", self.kind, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let rejected: tokio_jabber::Error = NegotiationError::AuthRejected {
            condition: String::from("not-authorized"),
            text: None,
        }
        .into();
        assert_eq!(ErrorKind::of(&rejected), ErrorKind::AuthRejected);
        let info = ErrorInfo::from_error(&rejected);
        assert_eq!(
            info.to_string(),
            "AuthRejected: negotiation error: authentication rejected: not-authorized"
        );
        let closed: tokio_jabber::Error = IoError::Closed.into();
        assert_eq!(ErrorKind::of(&closed), ErrorKind::StreamClosed);
    }

    #[test]
    fn test_source_downcasts() {
        let rejected = NegotiationError::AuthRejected {
            condition: String::from("not-authorized"),
            text: None,
        };
        let info = ErrorInfo::new(ErrorKind::AuthRejected, rejected.to_string())
            .with_source(Arc::new(rejected));
        let source = info.source.as_deref().unwrap();
        assert!(matches!(
            source.downcast_ref::<NegotiationError>(),
            Some(NegotiationError::AuthRejected { .. })
        ));
        assert!(ErrorInfo::new(ErrorKind::Reset, "x").source.is_none());
    }

    #[test]
    fn test_callback_info() {
        let info = ErrorInfo::callback(EventName::MessageChat, "boom");
        assert_eq!(info.to_string(), "Callback in message_chat handler: boom");
    }

    #[test]
    fn test_invalid_state_display() {
        let e = Error::InvalidState {
            operation: "send a message",
            state: SessionState::Disconnected,
        };
        assert_eq!(e.to_string(), "cannot send a message while Disconnected");
    }
}
