// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use xmpp_parsers::starttls::{Proceed, Request};

use super::next_element;
use crate::connect::StartTlsError;
use crate::error::NegotiationError;
use crate::ns;
use crate::xmlstream::XmlStream;

/// Ask for STARTTLS, run the handshake and reset the parser. The caller
/// re-initiates the stream.
pub(super) async fn starttls(stream: &mut XmlStream, domain: &str) -> Result<(), NegotiationError> {
    stream.send_element(&Request.into()).await?;

    let reply = next_element(stream).await?;
    if reply.is("failure", ns::TLS) {
        return Err(StartTlsError::Refused.into());
    }
    if Proceed::try_from(reply.clone()).is_err() {
        return Err(NegotiationError::UnexpectedStanza(reply.name().to_owned()));
    }

    stream.starttls(domain).await?;
    stream.reset();
    Ok(())
}
