#![forbid(unsafe_code)]

//! Public client facade and lifecycle control.
//!
//! Lifecycle: the builder assembles configuration, [`ClientBuilder::build`]
//! opens the pool and resolves once the first connection is Ready (Running),
//! [`Client::shutdown`] drains in-flight submissions up to a timeout and
//! then hard-closes whatever remains (Closed). After `shutdown` resolves,
//! every submission future has resolved.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rustls::RootCertStore;
use tokio::sync::Mutex;
use tracing::{info, warn};

use apns_auth::{SigningKey, TokenCache};
use apns_core::{ClientConfig, Endpoint, Error, Notification, Outcome, Result};

use crate::connect::{Connect, TlsConnector};
use crate::dispatcher::{AuthMode, Dispatcher};
use crate::metrics::{MetricsListener, NoopMetrics};
use crate::pool::Pool;
use crate::tls::{self, ClientIdentity};

const STATE_RUNNING: u8 = 0;
const STATE_SHUTTING_DOWN: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Asynchronous APNs client over a pool of HTTP/2 connections.
///
/// Cheap to clone; all clones share the same pool, token cache, and
/// lifecycle.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    dispatcher: Dispatcher,
    pool: Pool,
    state: AtomicU8,
    /// Serializes shutdown so late callers resolve only once the client
    /// actually reached Closed.
    shutdown_gate: Mutex<()>,
}

impl Client {
    /// Start configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Deliver one notification.
    ///
    /// Resolves to the server's verdict, or to an error when the
    /// submission could not produce one. Safe to call from any number of
    /// tasks concurrently.
    pub async fn send(&self, notification: &Notification) -> Result<Outcome> {
        match self.inner.state.load(Ordering::Acquire) {
            STATE_RUNNING => {}
            STATE_SHUTTING_DOWN => return Err(Error::ShuttingDown),
            _ => return Err(Error::ClientClosed),
        }
        self.inner.dispatcher.submit(notification).await
    }

    /// Endpoints currently Ready; mostly useful for health checks.
    pub fn ready_connections(&self) -> usize {
        self.inner.pool.ready_count()
    }

    /// Streams currently in flight across all connections.
    pub fn inflight(&self) -> usize {
        self.inner.pool.total_inflight()
    }

    /// Drain and close the client.
    ///
    /// New submissions are rejected immediately. In-flight submissions get
    /// up to `grace` to resolve; whatever remains is failed with
    /// `ClientClosed`. Concurrent and repeated calls resolve once the
    /// client is Closed.
    pub async fn shutdown(&self, grace: Duration) {
        let _gate = self.inner.shutdown_gate.lock().await;
        if self.inner.state.load(Ordering::Acquire) == STATE_CLOSED {
            return;
        }
        self.inner.state.store(STATE_SHUTTING_DOWN, Ordering::Release);

        info!(grace_secs = grace.as_secs(), "shutting down client");
        if tokio::time::timeout(grace, self.inner.pool.drain())
            .await
            .is_err()
        {
            warn!("drain did not finish within grace period, hard closing");
        }
        self.inner.pool.hard_close();
        self.inner.state.store(STATE_CLOSED, Ordering::Release);
    }
}

/// Authentication choice made on the builder.
enum BuilderAuth {
    Token(SigningKey),
    Certificate(ClientIdentity),
}

/// Assembles a [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    auth: Option<BuilderAuth>,
    roots: Option<RootCertStore>,
    connector: Option<Arc<dyn Connect>>,
    metrics: Option<Arc<dyn MetricsListener>>,
}

impl ClientBuilder {
    /// Target the production environment (the default).
    pub fn production(mut self) -> Self {
        self.config.endpoint = Endpoint::Production;
        self
    }

    /// Target the development sandbox.
    pub fn sandbox(mut self) -> Self {
        self.config.endpoint = Endpoint::Sandbox;
        self
    }

    /// Target an arbitrary host and port.
    pub fn server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.endpoint = Endpoint::Custom {
            host: host.into(),
            port,
        };
        self
    }

    /// Number of connections the pool maintains (default 1).
    pub fn concurrent_connections(mut self, n: usize) -> Self {
        self.config.concurrent_connections = n.max(1);
        self
    }

    /// Authenticate with provider tokens signed by `key`.
    ///
    /// Mutually exclusive with [`ClientBuilder::client_certificate`].
    pub fn signing_key(mut self, key: SigningKey) -> Self {
        self.auth = Some(BuilderAuth::Token(key));
        self
    }

    /// Authenticate with mutual TLS.
    ///
    /// No `authorization` header is sent in this mode. Mutually exclusive
    /// with [`ClientBuilder::signing_key`].
    pub fn client_certificate(mut self, identity: ClientIdentity) -> Self {
        self.auth = Some(BuilderAuth::Certificate(identity));
        self
    }

    /// Replace the default trust anchors.
    pub fn trusted_server_certificates(mut self, roots: RootCertStore) -> Self {
        self.roots = Some(roots);
        self
    }

    /// Supply the transport factory directly (proxies, test servers).
    ///
    /// Overrides the built-in TLS connector; TLS-related builder options
    /// are ignored.
    pub fn connector(mut self, connector: Arc<dyn Connect>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Handshake deadline per connection attempt (default 10s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Idle interval before a keepalive PING (default 60s).
    pub fn idle_ping_interval(mut self, interval: Duration) -> Self {
        self.config.idle_ping_interval = interval;
        self
    }

    /// Deadline applied to every submission (default: none).
    pub fn submission_deadline(mut self, deadline: Duration) -> Self {
        self.config.submission_deadline = Some(deadline);
        self
    }

    /// Provider token refresh interval (default 55 minutes).
    pub fn token_refresh_interval(mut self, interval: Duration) -> Self {
        self.config.token_refresh_interval = interval;
        self
    }

    /// Reconnect backoff base and cap (defaults 1s / 60s).
    pub fn reconnect_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.config.backoff_base = base;
        self.config.backoff_cap = cap;
        self
    }

    /// Receive metrics callbacks (default: none).
    pub fn metrics_listener(mut self, listener: Arc<dyn MetricsListener>) -> Self {
        self.metrics = Some(listener);
        self
    }

    /// Open the pool and resolve once the first connection is Ready.
    ///
    /// Fails when no authentication is configured or when every initial
    /// connection attempt fails.
    pub async fn build(self) -> Result<Client> {
        let auth = self
            .auth
            .ok_or_else(|| Error::auth("either a signing key or a client certificate is required"))?;

        // Certificate mode contributes the TLS identity; token mode
        // contributes the cache behind the `authorization` header.
        let (identity, auth_mode) = match auth {
            BuilderAuth::Token(key) => (
                None,
                AuthMode::Token(TokenCache::new([key], self.config.token_refresh_interval)),
            ),
            BuilderAuth::Certificate(identity) => (Some(identity), AuthMode::Certificate),
        };

        let connector: Arc<dyn Connect> = match self.connector {
            Some(connector) => connector,
            None => {
                let tls = tls::client_config(self.roots, identity)?;
                Arc::new(TlsConnector::new(
                    Arc::new(tls),
                    self.config.endpoint.host().to_owned(),
                    self.config.endpoint.port(),
                ))
            }
        };

        let metrics = self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics));
        let pool = Pool::start(self.config.clone(), connector, Arc::clone(&metrics)).await?;
        let dispatcher = Dispatcher::new(pool.clone(), auth_mode, metrics, self.config);

        Ok(Client {
            inner: Arc::new(ClientInner {
                dispatcher,
                pool,
                state: AtomicU8::new(STATE_RUNNING),
                shutdown_gate: Mutex::new(()),
            }),
        })
    }
}
