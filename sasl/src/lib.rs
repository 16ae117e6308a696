// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

#![no_std]
#![deny(missing_docs)]

//! Client side of the SASL exchange performed while negotiating a Jabber
//! stream.
//!
//! A mechanism is built from [`Credentials`], produces the initial
//! response, answers server challenges and finally checks the additional
//! data carried by the server's success message.
//!
//! ```
//! use sasl::client::mechanisms::Plain;
//! use sasl::client::Mechanism;
//! use sasl::common::Credentials;
//!
//! let creds = Credentials::default()
//!     .with_username("user")
//!     .with_password("pencil");
//! let mut mechanism = Plain::from_credentials(creds).unwrap();
//! assert_eq!(mechanism.name(), "PLAIN");
//! assert_eq!(mechanism.initial(), b"\0user\0pencil");
//! ```

extern crate alloc;

pub mod client;
pub mod common;

#[cfg(feature = "scram")]
pub use crate::client::mechanisms::{Scram, ScramSha1, ScramSha256};
pub use crate::client::{Mechanism, MechanismError};
pub use crate::common::{ChannelBinding, Credentials, Secret};
