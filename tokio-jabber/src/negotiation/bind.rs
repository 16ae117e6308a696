// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use log::Level;
use minidom::Element;
use xmpp_parsers::bind::{BindQuery, BindResponse};
use xmpp_parsers::jid::Jid;
use xmpp_parsers::stream_features::StreamFeatures;

use super::next_element;
use crate::error::NegotiationError;
use crate::log_to;
use crate::ns;
use crate::stanza::Stanza;
use crate::xmlstream::XmlStream;

const BIND_REQ_ID: &str = "resource-bind";
const SESSION_REQ_ID: &str = "session-start";

async fn iq_roundtrip(
    stream: &mut XmlStream,
    id: &str,
    payload: Element,
) -> Result<Stanza, NegotiationError> {
    let iq = Stanza::iq("set", None, id, payload);
    stream.send_element(iq.element()).await?;
    loop {
        let reply = next_element(stream).await?;
        match Stanza::try_from(reply) {
            Ok(reply @ Stanza::Iq(_)) if reply.id() == Some(id) => return Ok(reply),
            Ok(other) => log_to!(
                stream.logger(),
                Level::Debug,
                "Ignoring {:?} while waiting for {}",
                other.element().name(),
                id
            ),
            Err(element) => {
                return Err(NegotiationError::UnexpectedStanza(element.name().to_owned()))
            }
        }
    }
}

fn failure(reply: &Stanza) -> NegotiationError {
    NegotiationError::BindFailed(
        reply
            .error_condition()
            .unwrap_or_else(|| String::from("undefined-condition")),
    )
}

/// Bind a resource if the server offers binding. Returns the JID the
/// server assigned.
pub(super) async fn bind(
    stream: &mut XmlStream,
    features: &StreamFeatures,
    resource: Option<&str>,
) -> Result<Option<Jid>, NegotiationError> {
    if !features.can_bind() {
        // No resource binding available, do nothing.
        return Ok(None);
    }

    let query = BindQuery::new(resource.filter(|r| !r.is_empty()).map(String::from));
    let reply = iq_roundtrip(stream, BIND_REQ_ID, query.into()).await?;
    if reply.type_() != Some("result") {
        return Err(failure(&reply));
    }

    let payload = reply
        .element()
        .get_child("bind", ns::BIND)
        .ok_or_else(|| NegotiationError::BindFailed(String::from("no jid in bind result")))?;
    let jid = match BindResponse::try_from(payload.clone()) {
        Ok(response) => Jid::from(response),
        Err(e) => return Err(NegotiationError::BindFailed(e.to_string())),
    };
    log_to!(stream.logger(), Level::Debug, "Bound to {}", jid);
    Ok(Some(jid))
}

/// Establish a legacy session when the server insists on one.
pub(super) async fn establish_session(
    stream: &mut XmlStream,
    features: &StreamFeatures,
) -> Result<(), NegotiationError> {
    let required = features
        .others
        .iter()
        .find(|feature| feature.is("session", ns::SESSION))
        .is_some_and(|session| !session.has_child("optional", ns::SESSION));
    if !required {
        return Ok(());
    }

    let reply = iq_roundtrip(stream, SESSION_REQ_ID, Element::bare("session", ns::SESSION)).await?;
    if reply.type_() != Some("result") {
        return Err(failure(&reply));
    }
    Ok(())
}
