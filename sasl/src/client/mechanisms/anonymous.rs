use crate::client::{Mechanism, MechanismError};
use crate::common::{Credentials, Secret};

/// The ANONYMOUS mechanism.
///
/// Only usable on servers which allow guest logins.
pub struct Anonymous;

impl Anonymous {
    /// Constructs a new ANONYMOUS mechanism.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Anonymous {
        Anonymous
    }
}

impl Mechanism for Anonymous {
    fn name(&self) -> &str {
        "ANONYMOUS"
    }

    fn from_credentials(credentials: Credentials) -> Result<Anonymous, MechanismError> {
        match credentials.secret {
            Secret::None => Ok(Anonymous),
            Secret::Password(_) => Err(MechanismError::InvalidState),
        }
    }
}
