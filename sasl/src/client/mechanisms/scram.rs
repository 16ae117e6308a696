use alloc::string::String;
use alloc::vec::Vec;
use core::marker::PhantomData;

use base64::{engine::general_purpose::STANDARD as Base64, Engine};

use crate::client::{Mechanism, MechanismError};
use crate::common::scram::{generate_nonce, xor, ScramProvider, Sha1, Sha256};
use crate::common::{parse_frame, ChannelBinding, Credentials, Secret};

enum ScramState {
    Init,
    SentInitialMessage {
        initial_message: Vec<u8>,
        gs2_header: Vec<u8>,
    },
    GotServerData {
        server_signature: Vec<u8>,
    },
}

/// A struct for the SASL SCRAM-* and SCRAM-*-PLUS mechanisms.
pub struct Scram<S: ScramProvider> {
    name: String,
    username: String,
    password: String,
    client_nonce: String,
    state: ScramState,
    channel_binding: ChannelBinding,
    _marker: PhantomData<S>,
}

/// SCRAM-SHA-1.
pub type ScramSha1 = Scram<Sha1>;

/// SCRAM-SHA-256.
pub type ScramSha256 = Scram<Sha256>;

/// Escape `=` and `,` in a SCRAM username.
fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}

impl<S: ScramProvider> Scram<S> {
    /// Constructs a new struct for authenticating using the SASL SCRAM-* and
    /// SCRAM-*-PLUS mechanisms, depending on the passed channel binding.
    pub fn new<N: Into<String>, P: Into<String>>(
        username: N,
        password: P,
        channel_binding: ChannelBinding,
    ) -> Result<Scram<S>, MechanismError> {
        Ok(Scram::with_nonce(
            username,
            password,
            generate_nonce()?,
            channel_binding,
        ))
    }

    fn with_nonce<N: Into<String>, P: Into<String>>(
        username: N,
        password: P,
        client_nonce: String,
        channel_binding: ChannelBinding,
    ) -> Scram<S> {
        Scram {
            name: S::name().into(),
            username: username.into(),
            password: password.into(),
            client_nonce,
            state: ScramState::Init,
            channel_binding,
            _marker: PhantomData,
        }
    }
}

impl<S: ScramProvider> Mechanism for Scram<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn from_credentials(credentials: Credentials) -> Result<Scram<S>, MechanismError> {
        let username = credentials.username.ok_or(MechanismError::NoUsername)?;
        match credentials.secret {
            Secret::Password(password) => {
                Scram::new(username, password, credentials.channel_binding)
            }
            Secret::None => Err(MechanismError::NoPassword),
        }
    }

    fn initial(&mut self) -> Vec<u8> {
        let mut gs2_header = Vec::new();
        gs2_header.extend(self.channel_binding.header());
        let mut bare = Vec::new();
        bare.extend(b"n=");
        bare.extend(escape_username(&self.username).bytes());
        bare.extend(b",r=");
        bare.extend(self.client_nonce.bytes());
        let mut data = Vec::new();
        data.extend(&gs2_header);
        data.extend(&bare);
        self.state = ScramState::SentInitialMessage {
            initial_message: bare,
            gs2_header,
        };
        data
    }

    fn response(&mut self, challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        let next_state;
        let ret;
        match self.state {
            ScramState::SentInitialMessage {
                ref initial_message,
                ref gs2_header,
            } => {
                let frame = parse_frame(challenge).ok_or(MechanismError::CannotDecodeChallenge)?;
                let mut server_nonce = None;
                let mut salt = None;
                let mut iterations = None;
                for (key, value) in frame {
                    match key {
                        b'r' => server_nonce = Some(value),
                        b's' => salt = Some(value),
                        b'i' => iterations = Some(value),
                        _ => (),
                    }
                }
                let server_nonce = server_nonce.ok_or(MechanismError::CannotDecodeChallenge)?;
                if !server_nonce.starts_with(self.client_nonce.as_bytes()) {
                    return Err(MechanismError::NonceMismatch);
                }
                let salt = salt
                    .and_then(|salt| Base64.decode(salt).ok())
                    .ok_or(MechanismError::CannotDecodeChallenge)?;
                let iterations: u32 = iterations
                    .and_then(|i| core::str::from_utf8(i).ok())
                    .and_then(|i| i.parse().ok())
                    .ok_or(MechanismError::InvalidIterationCount)?;

                let mut client_final_message_bare = Vec::new();
                client_final_message_bare.extend(b"c=");
                client_final_message_bare.extend(Base64.encode(gs2_header).bytes());
                client_final_message_bare.extend(b",r=");
                client_final_message_bare.extend(server_nonce);

                let salted_password = S::derive(self.password.as_bytes(), &salt, iterations)?;
                let client_key = S::hmac(&salted_password, b"Client Key")?;
                let server_key = S::hmac(&salted_password, b"Server Key")?;

                let mut auth_message = Vec::new();
                auth_message.extend(initial_message);
                auth_message.push(b',');
                auth_message.extend(challenge);
                auth_message.push(b',');
                auth_message.extend(&client_final_message_bare);

                let stored_key = S::hash(&client_key);
                let client_signature = S::hmac(&stored_key, &auth_message)?;
                let client_proof = xor(&client_key, &client_signature);
                let server_signature = S::hmac(&server_key, &auth_message)?;

                let mut client_final_message = Vec::new();
                client_final_message.extend(&client_final_message_bare);
                client_final_message.extend(b",p=");
                client_final_message.extend(Base64.encode(client_proof).bytes());

                next_state = ScramState::GotServerData { server_signature };
                ret = client_final_message;
            }
            _ => return Err(MechanismError::InvalidState),
        }
        self.state = next_state;
        Ok(ret)
    }

    fn success(&mut self, data: &[u8]) -> Result<(), MechanismError> {
        let ScramState::GotServerData {
            ref server_signature,
        } = self.state
        else {
            return Err(MechanismError::InvalidState);
        };
        let frame = parse_frame(data).ok_or(MechanismError::CannotDecodeChallenge)?;
        for (key, value) in frame {
            match key {
                b'e' => return Err(MechanismError::ServerError),
                b'v' => {
                    let expected = Base64.encode(server_signature);
                    return if value == expected.as_bytes() {
                        Ok(())
                    } else {
                        Err(MechanismError::InvalidServerSignature)
                    };
                }
                _ => (),
            }
        }
        Err(MechanismError::CannotDecodeChallenge)
    }
}

impl<S: ScramProvider> core::fmt::Debug for Scram<S> {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(fmt, "Scram({})", self.name)
    }
}
