// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Client-side mechanisms.

use alloc::vec::Vec;
use core::fmt;

use crate::common::Credentials;

#[cfg(feature = "scram")]
use crate::common::scram::DeriveError;

pub mod mechanisms;

/// Errors a client mechanism can report.
#[derive(Debug, PartialEq, Eq)]
pub enum MechanismError {
    /// The credentials lack the username this mechanism needs.
    NoUsername,
    /// The credentials lack the password this mechanism needs.
    NoPassword,
    /// The server sent a challenge to a mechanism which expects none.
    NoServerChallenge,
    /// A server message could not be parsed.
    CannotDecodeChallenge,
    /// The nonce sent by the server does not extend ours.
    NonceMismatch,
    /// The iteration count is missing or not a number.
    InvalidIterationCount,
    /// The server reported an error inside its final message.
    ServerError,
    /// The server signature did not match the expected one.
    InvalidServerSignature,
    /// `success` or `response` was called out of order.
    InvalidState,

    /// A hash primitive failed.
    #[cfg(feature = "scram")]
    Derive(DeriveError),
}

#[cfg(feature = "scram")]
impl From<DeriveError> for MechanismError {
    fn from(err: DeriveError) -> MechanismError {
        MechanismError::Derive(err)
    }
}

impl fmt::Display for MechanismError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MechanismError::NoUsername => write!(fmt, "no username specified"),
            MechanismError::NoPassword => write!(fmt, "no password specified"),
            MechanismError::NoServerChallenge => {
                write!(fmt, "this mechanism does not expect a challenge")
            }
            MechanismError::CannotDecodeChallenge => write!(fmt, "can't decode server message"),
            MechanismError::NonceMismatch => write!(fmt, "server nonce does not extend ours"),
            MechanismError::InvalidIterationCount => write!(fmt, "invalid iteration count"),
            MechanismError::ServerError => write!(fmt, "server reported an error"),
            MechanismError::InvalidServerSignature => write!(fmt, "invalid server signature"),
            MechanismError::InvalidState => write!(fmt, "mechanism used out of order"),
            #[cfg(feature = "scram")]
            MechanismError::Derive(err) => write!(fmt, "{}", err),
        }
    }
}

impl core::error::Error for MechanismError {}

/// A SASL mechanism, seen from the client.
pub trait Mechanism {
    /// The name of the mechanism, as advertised by the server.
    fn name(&self) -> &str;

    /// Build the mechanism from credentials.
    fn from_credentials(credentials: Credentials) -> Result<Self, MechanismError>
    where
        Self: Sized;

    /// The initial response, sent along with the `<auth/>` element.
    fn initial(&mut self) -> Vec<u8> {
        Vec::new()
    }

    /// Answer a server challenge.
    fn response(&mut self, _challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        Err(MechanismError::NoServerChallenge)
    }

    /// Check the additional data sent with the server's success.
    fn success(&mut self, _data: &[u8]) -> Result<(), MechanismError> {
        Ok(())
    }
}
