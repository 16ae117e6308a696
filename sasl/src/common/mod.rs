// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Types shared between mechanisms.

use alloc::string::String;
use alloc::vec::Vec;

#[cfg(feature = "scram")]
pub mod scram;

/// The secret a client authenticates with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Secret {
    /// No secret, as used by ANONYMOUS.
    None,
    /// A plaintext password.
    Password(String),
}

/// Channel binding state, which ends up in the GS2 header of SCRAM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelBinding {
    /// The client does not support channel binding.
    None,
    /// The client supports channel binding but thinks the server does not.
    Unsupported,
}

impl ChannelBinding {
    /// The GS2 header announcing this binding.
    pub fn header(&self) -> &'static [u8] {
        match self {
            ChannelBinding::None => b"n,,",
            ChannelBinding::Unsupported => b"y,,",
        }
    }

    /// Whether a mechanism can be used with this binding state. Only the
    /// non-`-PLUS` variants are usable without binding data.
    pub fn supports(&self, mechanism: &str) -> bool {
        !mechanism.ends_with("-PLUS")
    }
}

/// What the client authenticates as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    /// The authentication identity, if any.
    pub username: Option<String>,
    /// The secret proving it.
    pub secret: Secret,
    /// Channel binding state.
    pub channel_binding: ChannelBinding,
}

impl Default for Credentials {
    fn default() -> Credentials {
        Credentials {
            username: None,
            secret: Secret::None,
            channel_binding: ChannelBinding::None,
        }
    }
}

impl Credentials {
    /// Set the username.
    pub fn with_username<N: Into<String>>(mut self, username: N) -> Credentials {
        self.username = Some(username.into());
        self
    }

    /// Set a plaintext password.
    pub fn with_password<P: Into<String>>(mut self, password: P) -> Credentials {
        self.secret = Secret::Password(password.into());
        self
    }

    /// Set the channel binding.
    pub fn with_channel_binding(mut self, channel_binding: ChannelBinding) -> Credentials {
        self.channel_binding = channel_binding;
        self
    }
}

/// Parses a comma separated list of `key=value` attributes, as used by
/// SCRAM messages.
pub fn parse_frame(frame: &[u8]) -> Option<Vec<(u8, &[u8])>> {
    let mut out = Vec::new();
    for part in frame.split(|&b| b == b',') {
        match part {
            [key, b'=', value @ ..] => out.push((*key, value)),
            _ => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame() {
        let frame = parse_frame(b"r=abc,s=QSX=,i=4096").unwrap();
        assert_eq!(
            frame,
            alloc::vec![(b'r', &b"abc"[..]), (b's', &b"QSX="[..]), (b'i', &b"4096"[..])]
        );
        assert!(parse_frame(b"r=abc,garbage").is_none());
    }

    #[test]
    fn test_gs2_header() {
        assert_eq!(ChannelBinding::None.header(), b"n,,");
        assert!(ChannelBinding::None.supports("SCRAM-SHA-1"));
        assert!(!ChannelBinding::None.supports("SCRAM-SHA-1-PLUS"));
    }
}
