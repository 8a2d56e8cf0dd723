#![forbid(unsafe_code)]

//! Client configuration.
//!
//! Collected by the builder in `apns-client` and shared read-only by the
//! pool, the connections, and the dispatcher.

use std::time::Duration;

/// Production APNs host.
pub const PRODUCTION_HOST: &str = "api.push.apple.com";
/// Development (sandbox) APNs host.
pub const SANDBOX_HOST: &str = "api.sandbox.push.apple.com";
/// Default APNs port.
pub const DEFAULT_PORT: u16 = 443;
/// Alternate port for firewall-constrained environments.
pub const ALTERNATE_PORT: u16 = 2197;

/// Which APNs environment to target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `api.push.apple.com:443`.
    Production,
    /// `api.sandbox.push.apple.com:443`.
    Sandbox,
    /// Arbitrary host and port, for proxies and test servers.
    Custom {
        /// Server hostname; also used for SNI.
        host: String,
        /// Server port.
        port: u16,
    },
}

impl Endpoint {
    /// Hostname for this endpoint.
    pub fn host(&self) -> &str {
        match self {
            Self::Production => PRODUCTION_HOST,
            Self::Sandbox => SANDBOX_HOST,
            Self::Custom { host, .. } => host,
        }
    }

    /// Port for this endpoint.
    pub fn port(&self) -> u16 {
        match self {
            Self::Production | Self::Sandbox => DEFAULT_PORT,
            Self::Custom { port, .. } => *port,
        }
    }

    /// Same host on port 2197.
    pub fn with_alternate_port(self) -> Self {
        Self::Custom {
            host: self.host().to_owned(),
            port: ALTERNATE_PORT,
        }
    }

    /// `host:port` string used as the HTTP/2 `:authority`.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host(), self.port())
    }
}

/// Tunables for the connection pool and the transport engine.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Target environment.
    pub endpoint: Endpoint,
    /// Number of concurrent connections the pool maintains.
    pub concurrent_connections: usize,
    /// TCP + TLS + HTTP/2 handshake deadline.
    pub connect_timeout: Duration,
    /// Idle interval after which a keepalive PING is sent.
    pub idle_ping_interval: Duration,
    /// Deadline for the PING acknowledgement.
    pub ping_timeout: Duration,
    /// Optional per-submission deadline.
    pub submission_deadline: Option<Duration>,
    /// Maximum callers parked waiting for a ready connection.
    pub wait_queue_limit: usize,
    /// Reconnect backoff base delay.
    pub backoff_base: Duration,
    /// Reconnect backoff cap.
    pub backoff_cap: Duration,
    /// Provider token refresh interval.
    pub token_refresh_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Production,
            concurrent_connections: 1,
            connect_timeout: Duration::from_secs(10),
            idle_ping_interval: Duration::from_secs(60),
            ping_timeout: Duration::from_secs(30),
            submission_deadline: None,
            wait_queue_limit: 1024,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(60),
            token_refresh_interval: Duration::from_secs(55 * 60),
        }
    }
}
