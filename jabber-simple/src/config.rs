// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::time::Duration;

use tokio_jabber::connect::{DnsConfig, TcpServerConnector, DEFAULT_CONNECT_TIMEOUT};
use tokio_jabber::negotiation::{NegotiationConfig, TlsPolicy, DEFAULT_MECHANISMS};

/// How long a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunFor {
    /// Until disconnected.
    #[default]
    Unbounded,
    /// For a fixed time.
    For(Duration),
}

impl RunFor {
    /// Seconds as in the classic `runfor` parameter: negative means forever.
    pub fn from_secs(secs: i64) -> RunFor {
        match u64::try_from(secs) {
            Ok(secs) => RunFor::For(Duration::from_secs(secs)),
            Err(_) => RunFor::Unbounded,
        }
    }
}

/// Everything a session needs to know.
#[derive(Debug, Clone)]
pub struct Config {
    /// Domain of the account.
    pub server: String,
    /// Local part of the account.
    pub username: String,
    /// Password.
    pub password: String,
    /// Resource to request.
    pub resource: Option<String>,
    /// Connect here instead of resolving `server`.
    pub host: Option<(String, u16)>,
    /// STARTTLS policy.
    pub tls: TlsPolicy,
    /// SASL mechanisms, most preferred first.
    pub preferred_mechanisms: Vec<String>,
    /// Heartbeat and poll interval.
    pub callback_freq: Duration,
    /// How long [`SimpleBot::run`][crate::SimpleBot::run] executes.
    pub runfor: RunFor,
    /// Route log lines through `debug_log` as well.
    pub debug: bool,
    /// Time allowed for the TCP connection.
    pub connect_timeout: Duration,
}

impl Config {
    /// Start a configuration with the required parameters.
    pub fn builder<S: Into<String>, U: Into<String>, P: Into<String>>(
        server: S,
        username: U,
        password: P,
    ) -> ConfigBuilder {
        ConfigBuilder {
            config: Config {
                server: server.into(),
                username: username.into(),
                password: password.into(),
                resource: None,
                host: None,
                tls: TlsPolicy::default(),
                preferred_mechanisms: DEFAULT_MECHANISMS.iter().map(|m| (*m).to_owned()).collect(),
                callback_freq: Duration::from_secs(1),
                runfor: RunFor::Unbounded,
                debug: false,
                connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            },
        }
    }

    /// What the negotiator needs.
    pub fn negotiation_config(&self) -> NegotiationConfig {
        NegotiationConfig {
            domain: self.server.clone(),
            username: Some(self.username.clone()).filter(|u| !u.is_empty()),
            password: self.password.clone(),
            resource: self.resource.clone(),
            tls: self.tls,
            preferred_mechanisms: self.preferred_mechanisms.clone(),
        }
    }

    /// How to find the server.
    pub fn dns_config(&self) -> DnsConfig {
        match &self.host {
            Some((host, port)) => DnsConfig::host(host, *port),
            #[cfg(feature = "dns")]
            None => DnsConfig::srv_default_client(&self.server),
            #[cfg(not(feature = "dns"))]
            None => DnsConfig::host(&self.server, tokio_jabber::connect::DEFAULT_CLIENT_PORT),
        }
    }

    /// A TCP connector for this configuration.
    pub fn connector(&self) -> TcpServerConnector {
        TcpServerConnector::new(self.dns_config()).with_timeout(self.connect_timeout)
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Request a resource.
    pub fn resource<R: Into<String>>(mut self, resource: R) -> Self {
        self.config.resource = Some(resource.into());
        self
    }

    /// Connect to `host:port` instead of resolving the server domain.
    pub fn host<H: Into<String>>(mut self, host: H, port: u16) -> Self {
        self.config.host = Some((host.into(), port));
        self
    }

    /// Set the STARTTLS policy.
    pub fn tls(mut self, tls: TlsPolicy) -> Self {
        self.config.tls = tls;
        self
    }

    /// Set the SASL mechanisms to try, most preferred first.
    pub fn mechanisms<I, S>(mut self, mechanisms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.preferred_mechanisms = mechanisms.into_iter().map(Into::into).collect();
        self
    }

    /// Heartbeat and poll interval.
    pub fn callback_freq(mut self, freq: Duration) -> Self {
        self.config.callback_freq = freq;
        self
    }

    /// How long to run.
    pub fn runfor(mut self, runfor: RunFor) -> Self {
        self.config.runfor = runfor;
        self
    }

    /// Route log lines through `debug_log`.
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Time allowed for the TCP connection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Finish.
    pub fn build(self) -> Config {
        self.config
    }
}
