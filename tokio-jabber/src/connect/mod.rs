//! `ServerConnector` provides connections to Jabber servers

use core::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::Connection;
use crate::error::ConnectError;

mod dns;
pub use dns::{DnsConfig, DEFAULT_CLIENT_PORT};

mod tcp;
pub use tcp::{connect, TcpServerConnector};

pub(crate) mod tls;
pub use tls::StartTlsError;

/// Byte stream a [`Connection`] is built on
pub trait AsyncReadAndWrite: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncReadAndWrite for T {}

/// Type-erased byte stream, so that plaintext and TLS sockets can live in the
/// same [`Connection`]
pub type BoxedStream = Box<dyn AsyncReadAndWrite>;

/// Default time allowed for the TCP connection to come up
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait called to connect to a server, perhaps called multiple times
pub trait ServerConnector: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Open the byte stream. Nothing is written to it yet.
    fn connect(&self) -> impl Future<Output = Result<Connection, ConnectError>> + Send;
}
