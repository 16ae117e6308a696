//! TLS upgrade of an established connection

use bytes::Bytes;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

use tokio_rustls::{
    rustls::pki_types::{InvalidDnsNameError, ServerName},
    rustls::{ClientConfig, RootCertStore},
    TlsConnector,
};

use crate::connect::BoxedStream;
use crate::connection::Prefixed;
use crate::logging::Logger;

#[cfg_attr(not(feature = "rustls-native-certs"), allow(unused_variables))]
fn root_store(logger: &Logger) -> Result<RootCertStore, StartTlsError> {
    #[allow(unused_mut)]
    let mut root_store = RootCertStore::empty();
    #[cfg(feature = "webpki-roots")]
    {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    #[cfg(feature = "rustls-native-certs")]
    {
        let (added, ignored) =
            root_store.add_parsable_certificates(rustls_native_certs::load_native_certs()?);
        crate::log_to!(
            logger,
            log::Level::Debug,
            "Loaded {} native root certificates, ignored {}",
            added,
            ignored
        );
    }
    Ok(root_store)
}

/// Run the TLS handshake over `stream`, feeding it `pending` first.
pub(crate) async fn connect(
    stream: BoxedStream,
    pending: Bytes,
    domain: &str,
    logger: &Logger,
) -> Result<BoxedStream, StartTlsError> {
    let domain = ServerName::try_from(domain.to_owned())?;
    let config = ClientConfig::builder()
        .with_root_certificates(root_store(logger)?)
        .with_no_client_auth();
    let tls_stream = TlsConnector::from(Arc::new(config))
        .connect(domain, Prefixed::new(pending, stream))
        .await
        .map_err(StartTlsError::Tls)?;
    Ok(Box::new(tls_stream))
}

/// StartTLS Error
#[derive(Debug)]
pub enum StartTlsError {
    /// The server refused to proceed with TLS
    Refused,
    /// TLS handshake error
    Tls(io::Error),
    /// DNS name parsing error
    DnsNameError(InvalidDnsNameError),
    /// Error loading certificates or using the socket
    Io(io::Error),
}

impl fmt::Display for StartTlsError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Refused => write!(fmt, "server refused STARTTLS"),
            Self::Tls(e) => write!(fmt, "TLS error: {}", e),
            Self::DnsNameError(e) => write!(fmt, "DNS name error: {}", e),
            Self::Io(e) => write!(fmt, "IO error: {}", e),
        }
    }
}

impl StdError for StartTlsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Refused => None,
            Self::Tls(e) | Self::Io(e) => Some(e),
            Self::DnsNameError(e) => Some(e),
        }
    }
}

impl From<InvalidDnsNameError> for StartTlsError {
    fn from(e: InvalidDnsNameError) -> Self {
        Self::DnsNameError(e)
    }
}

impl From<io::Error> for StartTlsError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
