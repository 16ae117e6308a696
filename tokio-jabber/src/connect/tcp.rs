//! `TcpServerConnector` connects over TCP, resolving the server through DNS

use std::time::Duration;

use log::Level;

use crate::{
    connect::{DnsConfig, ServerConnector, DEFAULT_CONNECT_TIMEOUT},
    connection::{Connection, TlsState},
    error::ConnectError,
    log_to,
    logging::Logger,
};

/// Connect via plaintext TCP. The stream is secured later with STARTTLS.
#[derive(Debug, Clone)]
pub struct TcpServerConnector {
    dns_config: DnsConfig,
    timeout: Duration,
    logger: Logger,
}

impl TcpServerConnector {
    /// Connector for the given resolution strategy.
    pub fn new(dns_config: DnsConfig) -> TcpServerConnector {
        TcpServerConnector {
            dns_config,
            timeout: DEFAULT_CONNECT_TIMEOUT,
            logger: Logger::default(),
        }
    }

    /// Log resolution to `logger`, which the connection then inherits.
    pub fn with_logger(mut self, logger: Logger) -> TcpServerConnector {
        self.logger = logger;
        self
    }

    /// Change the connect timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> TcpServerConnector {
        self.timeout = timeout;
        self
    }

    /// The resolution strategy.
    pub fn dns_config(&self) -> &DnsConfig {
        &self.dns_config
    }
}

impl From<DnsConfig> for TcpServerConnector {
    fn from(dns_config: DnsConfig) -> TcpServerConnector {
        TcpServerConnector::new(dns_config)
    }
}

impl ServerConnector for TcpServerConnector {
    async fn connect(&self) -> Result<Connection, ConnectError> {
        log_to!(self.logger, Level::Debug, "Connecting to {}", self.dns_config);
        let resolve = self.dns_config.resolve_with(&self.logger);
        let stream = tokio::time::timeout(self.timeout, resolve)
            .await
            .map_err(|_| ConnectError::Timeout)??;
        if let Err(e) = stream.set_nodelay(true) {
            log_to!(self.logger, Level::Debug, "Failed to set TCP_NODELAY: {}", e);
        }
        let mut connection = Connection::new(Box::new(stream), TlsState::Plaintext);
        connection.set_logger(self.logger.clone());
        Ok(connection)
    }
}

/// Open a plaintext connection to `host:port`.
pub async fn connect(host: &str, port: u16) -> Result<Connection, ConnectError> {
    TcpServerConnector::new(DnsConfig::host(host, port))
        .connect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });
        let conn = connect("127.0.0.1", addr.port()).await.unwrap();
        assert_eq!(conn.tls_state(), TlsState::Plaintext);
        assert!(conn.is_open());
        accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        match connect("127.0.0.1", port).await {
            Err(ConnectError::RefusedConnection(_)) => (),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_connector_logger_is_inherited() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = lines.clone();
        let logger = Logger::new(Arc::new(move |_, line: &str| {
            sink_lines.lock().unwrap().push(line.to_owned());
        }));
        let conn = TcpServerConnector::new(DnsConfig::host("127.0.0.1", addr.port()))
            .with_logger(logger)
            .connect()
            .await
            .unwrap();
        assert!(conn.logger().has_sink());
        assert_eq!(
            *lines.lock().unwrap(),
            vec![format!("Connecting to {}", addr)]
        );
        accept.await.unwrap().unwrap();
    }
}
