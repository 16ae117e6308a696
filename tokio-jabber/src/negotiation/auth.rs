// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::str::FromStr;

use log::Level;
use minidom::Element;
use sasl::client::mechanisms::{Anonymous, Plain, ScramSha1, ScramSha256};
use sasl::client::{Mechanism, MechanismError};
use sasl::common::Credentials;
use xmpp_parsers::sasl::{Auth, Challenge, Failure, Mechanism as XMPPMechanism, Response, Success};
use xmpp_parsers::stream_features::StreamFeatures;

use super::{next_element, NegotiationConfig};
use crate::error::NegotiationError;
use crate::log_to;
use crate::logging::Logger;
use crate::ns;
use crate::xmlstream::XmlStream;

pub(super) type BoxedMechanism = Box<dyn Mechanism + Send>;

fn build_mechanism(
    name: &str,
    credentials: &Credentials,
    logger: &Logger,
) -> Option<BoxedMechanism> {
    let built: Result<BoxedMechanism, MechanismError> = match name {
        "SCRAM-SHA-256" => {
            ScramSha256::from_credentials(credentials.clone()).map(|m| Box::new(m) as BoxedMechanism)
        }
        "SCRAM-SHA-1" => {
            ScramSha1::from_credentials(credentials.clone()).map(|m| Box::new(m) as BoxedMechanism)
        }
        "PLAIN" => Plain::from_credentials(credentials.clone()).map(|m| Box::new(m) as BoxedMechanism),
        "ANONYMOUS" => {
            Anonymous::from_credentials(credentials.clone()).map(|m| Box::new(m) as BoxedMechanism)
        }
        _ => return None,
    };
    match built {
        Ok(mechanism) => Some(mechanism),
        Err(e) => {
            log_to!(logger, Level::Debug, "Skipping {}: {}", name, e);
            None
        }
    }
}

/// The first preferred mechanism the server offers and our credentials
/// can satisfy.
pub(super) fn select_mechanism(
    features: &StreamFeatures,
    config: &NegotiationConfig,
    logger: &Logger,
) -> Result<BoxedMechanism, NegotiationError> {
    let offered = &features.sasl_mechanisms.mechanisms;
    log_to!(logger, Level::Debug, "Server offers SASL mechanisms {:?}", offered);

    let mut credentials = Credentials::default();
    if !config.password.is_empty() {
        credentials = credentials.with_password(config.password.clone());
    }
    if let Some(username) = &config.username {
        credentials = credentials.with_username(username.clone());
    }

    let mechanism = config
        .preferred_mechanisms
        .iter()
        .filter(|name| offered.iter().any(|offer| offer == *name))
        .find_map(|name| build_mechanism(name, &credentials, logger))
        .ok_or(NegotiationError::NoMechanism)?;
    log_to!(logger, Level::Debug, "Selected SASL mechanism {}", mechanism.name());
    Ok(mechanism)
}

fn failure(failure: Failure) -> NegotiationError {
    let condition = Element::from(failure.defined_condition).name().to_owned();
    let text = failure
        .texts
        .get("")
        .or_else(|| failure.texts.values().next())
        .cloned();
    NegotiationError::AuthRejected { condition, text }
}

/// Run the SASL exchange until `<success/>` or `<failure/>`.
pub(super) async fn authenticate(
    stream: &mut XmlStream,
    mut mechanism: BoxedMechanism,
) -> Result<(), NegotiationError> {
    let mechanism_name =
        XMPPMechanism::from_str(mechanism.name()).map_err(|_| NegotiationError::NoMechanism)?;
    let auth = Auth {
        mechanism: mechanism_name,
        data: mechanism.initial(),
    };
    stream.send_element(&auth.into()).await?;

    loop {
        let reply = next_element(stream).await?;
        if reply.ns() != ns::SASL {
            return Err(NegotiationError::UnexpectedStanza(reply.name().to_owned()));
        }
        let name = reply.name().to_owned();
        if let Ok(challenge) = Challenge::try_from(reply.clone()) {
            let response = mechanism.response(&challenge.data)?;
            stream
                .send_element(&Response { data: response }.into())
                .await?;
        } else if let Ok(success) = Success::try_from(reply.clone()) {
            mechanism.success(&success.data)?;
            return Ok(());
        } else if let Ok(rejected) = Failure::try_from(reply) {
            return Err(failure(rejected));
        } else if name == "failure" {
            log_to!(stream.logger(), Level::Debug, "Unparseable SASL failure");
            return Err(NegotiationError::AuthRejected {
                condition: String::from("not-authorized"),
                text: None,
            });
        } else if name == "challenge" || name == "success" {
            return Err(NegotiationError::Sasl(MechanismError::CannotDecodeChallenge));
        } else {
            return Err(NegotiationError::UnexpectedStanza(name));
        }
    }
}
