use alloc::string::String;
use alloc::vec::Vec;

use crate::client::{Mechanism, MechanismError};
use crate::common::{Credentials, Secret};

/// The PLAIN mechanism.
///
/// Sends the password in clear; only use it over a secured stream.
pub struct Plain {
    username: String,
    password: String,
}

impl Plain {
    /// Constructs a new PLAIN mechanism.
    pub fn new<N: Into<String>, P: Into<String>>(username: N, password: P) -> Plain {
        Plain {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Mechanism for Plain {
    fn name(&self) -> &str {
        "PLAIN"
    }

    fn from_credentials(credentials: Credentials) -> Result<Plain, MechanismError> {
        let username = credentials.username.ok_or(MechanismError::NoUsername)?;
        match credentials.secret {
            Secret::Password(password) => Ok(Plain::new(username, password)),
            Secret::None => Err(MechanismError::NoPassword),
        }
    }

    fn initial(&mut self) -> Vec<u8> {
        let mut auth = Vec::with_capacity(self.username.len() + self.password.len() + 2);
        auth.push(0);
        auth.extend(self.username.bytes());
        auth.push(0);
        auth.extend(self.password.bytes());
        auth
    }
}
