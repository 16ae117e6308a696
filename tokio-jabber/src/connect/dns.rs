//! Finding the socket address of a Jabber server

#[cfg(feature = "dns")]
use futures::{future::select_ok, FutureExt};
#[cfg(feature = "dns")]
use hickory_resolver::{
    config::LookupIpStrategy, name_server::TokioConnectionProvider, IntoName, TokioAsyncResolver,
};
#[cfg(feature = "dns")]
use log::Level;
use std::net::{IpAddr, SocketAddr};
use tokio::net::TcpStream;

use crate::error::ConnectError;
use crate::logging::Logger;

/// Port of the client service when nothing else is known
pub const DEFAULT_CLIENT_PORT: u16 = 5222;

/// SRV service label of the client service
#[cfg(feature = "dns")]
pub const CLIENT_SRV: &str = "_xmpp-client._tcp";

/// How to get from a server name to a socket
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DnsConfig {
    /// Look up SRV records for the domain, falling back to its address
    #[cfg(feature = "dns")]
    Srv {
        /// The account domain
        domain: String,
        /// SRV service label, e.g. `_xmpp-client._tcp`
        service: String,
        /// Port used with the domain's own address when there is no record
        fallback_port: u16,
    },

    /// Resolve a host name and connect to a fixed port
    Host {
        /// Host name
        host: String,
        /// Port
        port: u16,
    },

    /// A known socket address, no DNS involved
    Addr {
        /// Address and port
        addr: SocketAddr,
    },
}

impl std::fmt::Display for DnsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "dns")]
            Self::Srv {
                domain, service, ..
            } => write!(f, "{}.{}", service, domain),
            Self::Host { host, port } => write!(f, "{}:{}", host, port),
            Self::Addr { addr } => write!(f, "{}", addr),
        }
    }
}

impl DnsConfig {
    /// The usual client lookup: `_xmpp-client._tcp.<domain>`, then
    /// `<domain>:5222`.
    #[cfg(feature = "dns")]
    pub fn srv_default_client(domain: &str) -> Self {
        Self::Srv {
            domain: domain.to_owned(),
            service: CLIENT_SRV.to_owned(),
            fallback_port: DEFAULT_CLIENT_PORT,
        }
    }

    /// An explicit host and port. IP literals skip DNS altogether.
    pub fn host(host: &str, port: u16) -> Self {
        match host.parse::<IpAddr>() {
            Ok(ip) => Self::Addr {
                addr: SocketAddr::new(ip, port),
            },
            Err(_) => Self::Host {
                host: host.to_owned(),
                port,
            },
        }
    }

    /// Resolve and connect.
    pub async fn resolve(&self) -> Result<TcpStream, ConnectError> {
        self.resolve_with(&Logger::default()).await
    }

    /// Resolve and connect, logging the attempts to `logger`.
    #[cfg_attr(not(feature = "dns"), allow(unused_variables))]
    pub async fn resolve_with(&self, logger: &Logger) -> Result<TcpStream, ConnectError> {
        match self {
            #[cfg(feature = "dns")]
            Self::Srv {
                domain,
                service,
                fallback_port,
            } => connect_srv(domain, service, *fallback_port, logger).await,
            Self::Host { host, port } => connect_host(host, *port).await,
            Self::Addr { addr } => connect_addr(*addr).await,
        }
    }
}

async fn connect_addr(addr: SocketAddr) -> Result<TcpStream, ConnectError> {
    TcpStream::connect(addr).await.map_err(ConnectError::from_io)
}

/// Without a resolver of our own, the system one does.
#[cfg(not(feature = "dns"))]
async fn connect_host(host: &str, port: u16) -> Result<TcpStream, ConnectError> {
    let addresses = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ConnectError::DnsFailure(format!("{}: {}", host, e)))?;
    let mut last_error = ConnectError::DnsFailure(format!("{}: no address", host));
    for addr in addresses {
        match connect_addr(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = e,
        }
    }
    Err(last_error)
}

#[cfg(feature = "dns")]
async fn connect_srv(
    domain: &str,
    service: &str,
    fallback_port: u16,
    logger: &Logger,
) -> Result<TcpStream, ConnectError> {
    let ascii_domain = idna::domain_to_ascii(domain)?;
    if let Ok(ip) = ascii_domain.parse::<IpAddr>() {
        return connect_addr(SocketAddr::new(ip, fallback_port)).await;
    }

    let resolver = TokioAsyncResolver::tokio_from_system_conf()?;
    let name = format!("{}.{}.", service, ascii_domain).into_name()?;
    let lookup = match resolver.srv_lookup(name.clone()).await {
        Ok(lookup) => lookup,
        Err(e) => {
            crate::log_to!(logger, Level::Debug, "No SRV record for {}: {}", name, e);
            return connect_host(&ascii_domain, fallback_port).await;
        }
    };

    // Lowest priority first, heaviest weight first within a priority.
    let mut targets: Vec<(u16, u16, String, u16)> = lookup
        .iter()
        .map(|srv| {
            (
                srv.priority(),
                u16::MAX - srv.weight(),
                srv.target().to_ascii(),
                srv.port(),
            )
        })
        .collect();
    targets.sort();

    let mut last_error = ConnectError::DnsFailure(format!("{}: empty SRV answer", name));
    for (_, _, target, port) in targets {
        // A lone "." means the service is not offered.
        if target == "." {
            continue;
        }
        crate::log_to!(logger, Level::Debug, "Trying SRV target {}:{}", target, port);
        match connect_host(&target, port).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                crate::log_to!(
                    logger,
                    Level::Debug,
                    "SRV target {}:{} failed: {}",
                    target,
                    port,
                    e
                );
                last_error = e;
            }
        }
    }
    Err(last_error)
}

#[cfg(feature = "dns")]
async fn connect_host(host: &str, port: u16) -> Result<TcpStream, ConnectError> {
    let ascii_host = idna::domain_to_ascii(host)?;
    if let Ok(ip) = ascii_host.parse::<IpAddr>() {
        return connect_addr(SocketAddr::new(ip, port)).await;
    }

    let (config, mut options) = hickory_resolver::system_conf::read_system_conf()?;
    options.ip_strategy = LookupIpStrategy::Ipv4AndIpv6;
    let resolver = TokioAsyncResolver::new(config, options, TokioConnectionProvider::default());
    let addresses = resolver.lookup_ip(ascii_host.as_str()).await?;

    let attempts: Vec<_> = addresses
        .into_iter()
        .map(|ip| TcpStream::connect(SocketAddr::new(ip, port)).boxed())
        .collect();
    if attempts.is_empty() {
        return Err(ConnectError::DnsFailure(format!("{}: no address", host)));
    }
    // Every address at once; the first to connect wins.
    select_ok(attempts)
        .await
        .map(|(stream, _)| stream)
        .map_err(ConnectError::from_io)
}
