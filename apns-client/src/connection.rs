#![forbid(unsafe_code)]

//! Single HTTP/2 connection to APNs.
//!
//! Lifecycle follows a small state machine:
//!
//! ```text
//! Connecting --(handshake ok)-------> Ready
//! Connecting --(tls/handshake err)--> Closed
//! Ready      --(local close)--------> Draining --(inflight == 0)--> Closed
//! Ready      --(io error | goaway | ping timeout)-----------------> Closed
//! ```
//!
//! `Connecting` lives inside [`ConnectionEndpoint::connect`]; an endpoint
//! value only exists once the handshake succeeded. Each endpoint owns two
//! background tasks: a driver that polls the `h2` connection (and samples
//! the peer's advertised stream limit from SETTINGS), and a keepalive that
//! PINGs after idle periods and closes the connection when an ACK does not
//! arrive in time. A server GOAWAY drains inside `h2`: the driver future
//! resolves only after surviving streams finish, which is when the
//! endpoint reaches Closed.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use h2::client::{ResponseFuture, SendRequest};
use h2::{Ping, PingPong, Reason};
use http::{Method, Request, StatusCode, Version};
use tokio::sync::{watch, Notify};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use apns_core::outcome::ErrorResponse;
use apns_core::{ClientConfig, Error, Notification, Outcome, Result};

use crate::connect::{Connect, IoStream};

/// Observable lifecycle state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// TCP/TLS/HTTP-2 handshake in progress.
    Connecting,
    /// Accepting new streams.
    Ready,
    /// No new streams; waiting for in-flight streams to finish.
    Draining,
    /// Terminal.
    Closed,
}

/// Why a connection reached Closed; the first cause wins.
#[derive(Debug, Clone)]
enum CloseCause {
    /// Keepalive PING went unacknowledged.
    IdleTimeout,
    /// Closed by this side (drain or hard close).
    Local,
    /// Transport ended: io error, protocol error, or peer GOAWAY drained.
    Transport(String),
}

struct Shared {
    id: usize,
    state: watch::Sender<ConnectionState>,
    inflight: AtomicUsize,
    /// Peer stream limit; 1 until the first SETTINGS is observed.
    max_streams: AtomicUsize,
    last_selected: AtomicU64,
    last_activity: Mutex<Instant>,
    close_cause: Mutex<Option<CloseCause>>,
    /// Notified on every stream completion; used by graceful close.
    stream_done: Notify,
    /// Pool-level wakeups: stream completions and readiness changes.
    events: Arc<Notify>,
    shutdown: CancellationToken,
}

impl Shared {
    fn new(id: usize, events: Arc<Notify>, shutdown: CancellationToken) -> Self {
        Self {
            id,
            state: watch::Sender::new(ConnectionState::Ready),
            inflight: AtomicUsize::new(0),
            max_streams: AtomicUsize::new(1),
            last_selected: AtomicU64::new(0),
            last_activity: Mutex::new(Instant::now()),
            close_cause: Mutex::new(None),
            stream_done: Notify::new(),
            events,
            shutdown,
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn touch(&self) {
        if let Ok(mut at) = self.last_activity.lock() {
            *at = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .map(|at| at.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Transition to Closed, recording `cause` unless one is already set.
    fn close(&self, cause: CloseCause) {
        if let Ok(mut slot) = self.close_cause.lock() {
            if slot.is_none() {
                debug!(connection = self.id, ?cause, "connection closed");
                *slot = Some(cause);
            }
        }
        self.state.send_replace(ConnectionState::Closed);
        self.shutdown.cancel();
        self.stream_done.notify_waiters();
        self.events.notify_waiters();
    }

    fn close_cause(&self) -> Option<CloseCause> {
        self.close_cause.lock().ok().and_then(|slot| slot.clone())
    }

    /// Map an `h2` stream error into the taxonomy, preferring the
    /// connection's recorded close cause over the raw error.
    fn submission_error(&self, source: h2::Error) -> Error {
        match self.close_cause() {
            Some(CloseCause::IdleTimeout) => Error::IdleTimeout,
            Some(CloseCause::Local) => Error::ClientClosed,
            Some(CloseCause::Transport(msg)) => Error::connection(msg),
            None => {
                if source.is_io() {
                    Error::connection(format!("connection lost: {source}"))
                } else {
                    match source.reason() {
                        Some(reason)
                            if reason == Reason::CANCEL || reason == Reason::REFUSED_STREAM =>
                        {
                            Error::stream(format!("stream reset: {source}"))
                        }
                        Some(_) => Error::connection(format!("connection error: {source}")),
                        None => Error::Http2(source),
                    }
                }
            }
        }
    }
}

/// Decrements the in-flight count exactly once, on response completion,
/// stream reset, connection loss, or deadline.
struct StreamBinding {
    shared: Arc<Shared>,
}

impl StreamBinding {
    fn new(shared: Arc<Shared>) -> Self {
        shared.inflight.fetch_add(1, Ordering::AcqRel);
        shared.touch();
        Self { shared }
    }
}

impl Drop for StreamBinding {
    fn drop(&mut self) {
        self.shared.inflight.fetch_sub(1, Ordering::AcqRel);
        self.shared.touch();
        self.shared.stream_done.notify_waiters();
        self.shared.events.notify_waiters();
    }
}

/// One multiplexed HTTP/2 connection plus its driver and keepalive tasks.
pub struct ConnectionEndpoint {
    shared: Arc<Shared>,
    send_request: SendRequest<Bytes>,
    authority: String,
}

impl ConnectionEndpoint {
    /// Establish a connection through `connector` and spawn its tasks.
    ///
    /// The whole connect + HTTP/2 handshake is bounded by
    /// `config.connect_timeout`. `events` receives pool-level wakeups;
    /// `parent` links the endpoint into the pool's hard-close domain.
    pub async fn connect(
        id: usize,
        connector: &dyn Connect,
        config: &ClientConfig,
        events: Arc<Notify>,
        parent: &CancellationToken,
    ) -> Result<Arc<Self>> {
        let handshake = async {
            let io = connector.connect().await?;
            let (send_request, connection) = h2::client::handshake(io).await?;
            Ok::<_, Error>((send_request, connection))
        };
        let (send_request, mut connection) = timeout(config.connect_timeout, handshake)
            .await
            .map_err(|_| Error::connection("handshake timed out"))?
            .map_err(|e| Error::connection(format!("handshake failed: {e}")))?;

        let shared = Arc::new(Shared::new(id, events, parent.child_token()));
        debug!(connection = id, "connection ready");

        let ping_pong = connection.ping_pong();
        spawn_driver(Arc::clone(&shared), connection);
        if let Some(ping_pong) = ping_pong {
            spawn_keepalive(
                Arc::clone(&shared),
                ping_pong,
                config.idle_ping_interval,
                config.ping_timeout,
            );
        }

        Ok(Arc::new(Self {
            shared,
            send_request,
            authority: config.endpoint.authority(),
        }))
    }

    /// Identifier for logs.
    pub fn id(&self) -> usize {
        self.shared.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Number of open stream bindings.
    pub fn inflight(&self) -> usize {
        self.shared.inflight.load(Ordering::Acquire)
    }

    /// Peer stream limit from the last SETTINGS; 1 until the first one.
    pub fn max_concurrent_streams(&self) -> usize {
        self.shared.max_streams.load(Ordering::Relaxed)
    }

    /// Ready and below the peer's stream limit.
    pub fn is_available(&self) -> bool {
        self.state() == ConnectionState::Ready && self.inflight() < self.max_concurrent_streams()
    }

    pub(crate) fn mark_selected(&self, stamp: u64) {
        self.shared.last_selected.store(stamp, Ordering::Relaxed);
    }

    pub(crate) fn last_selected(&self) -> u64 {
        self.shared.last_selected.load(Ordering::Relaxed)
    }

    /// Open a new stream carrying `notification` and return the pending
    /// response once the request is fully written.
    ///
    /// `bearer` is the encoded provider token; `None` in mutual-TLS mode.
    pub async fn send(
        &self,
        notification: &Notification,
        bearer: Option<&str>,
    ) -> Result<PendingResponse> {
        if self.state() != ConnectionState::Ready {
            return Err(Error::stream("connection is not ready"));
        }

        let request = build_request(&self.authority, notification, bearer)?;
        let mut ready = self
            .send_request
            .clone()
            .ready()
            .await
            .map_err(|e| self.shared.submission_error(e))?;
        let (response, mut body) = ready
            .send_request(request, false)
            .map_err(|e| self.shared.submission_error(e))?;

        let binding = StreamBinding::new(Arc::clone(&self.shared));
        write_body(&mut body, notification.payload().clone(), &self.shared).await?;

        Ok(PendingResponse { response, binding })
    }

    /// Close the connection.
    ///
    /// Graceful close stops new streams and waits for in-flight streams to
    /// finish; hard close cancels everything immediately.
    pub async fn close(&self, graceful: bool) {
        if graceful && self.state() == ConnectionState::Ready {
            self.shared.state.send_replace(ConnectionState::Draining);
            self.shared.events.notify_waiters();
            loop {
                let drained = self.shared.stream_done.notified();
                tokio::pin!(drained);
                // Register interest before the check so a completion
                // between check and await cannot be missed.
                drained.as_mut().enable();
                if self.shared.inflight.load(Ordering::Acquire) == 0
                    || self.state() == ConnectionState::Closed
                {
                    break;
                }
                drained.await;
            }
        }
        self.shared.close(CloseCause::Local);
    }

    /// Resolve once the connection reaches Closed.
    pub async fn closed(&self) {
        let mut rx = self.shared.state.subscribe();
        while *rx.borrow() != ConnectionState::Closed {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

/// A submission bound to an open HTTP/2 stream.
///
/// Dropping it before [`PendingResponse::outcome`] resolves resets the
/// stream (RST_STREAM with CANCEL) and releases the binding.
pub struct PendingResponse {
    response: ResponseFuture,
    binding: StreamBinding,
}

impl PendingResponse {
    /// Await the server's verdict on this stream.
    pub async fn outcome(self) -> Result<Outcome> {
        let shared = Arc::clone(&self.binding.shared);
        let response = self
            .response
            .await
            .map_err(|e| shared.submission_error(e))?;
        shared.touch();

        let (parts, mut body) = response.into_parts();
        if parts.status == StatusCode::OK {
            let apns_id = parts
                .headers
                .get("apns-id")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| Uuid::try_parse(s).ok());
            return Ok(Outcome::Accepted { apns_id });
        }

        let mut buf = Vec::new();
        while let Some(chunk) = body.data().await {
            let chunk = chunk.map_err(|e| shared.submission_error(e))?;
            let _ = body.flow_control().release_capacity(chunk.len());
            buf.extend_from_slice(&chunk);
        }
        Ok(ErrorResponse::parse(&buf).into_outcome())
    }
}

/// Build the request headers for one notification.
fn build_request(
    authority: &str,
    notification: &Notification,
    bearer: Option<&str>,
) -> Result<Request<()>> {
    let uri = http::Uri::builder()
        .scheme("https")
        .authority(authority)
        .path_and_query(format!("/3/device/{}", notification.device_token()))
        .build()
        .map_err(|e| Error::stream(format!("request uri: {e}")))?;

    let mut request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .version(Version::HTTP_2)
        .header("apns-topic", notification.topic());

    if let Some(push_type) = notification.push_type() {
        request = request.header("apns-push-type", push_type.as_str());
    }
    if let Some(id) = notification.apns_id() {
        request = request.header("apns-id", id.to_string());
    }
    if let Some(expiration) = notification.expiration_secs() {
        request = request.header("apns-expiration", expiration);
    }
    if let Some(priority) = notification.priority() {
        request = request.header("apns-priority", priority.as_u8() as u64);
    }
    if let Some(collapse_id) = notification.collapse_id() {
        request = request.header("apns-collapse-id", collapse_id);
    }
    if let Some(token) = bearer {
        request = request.header("authorization", format!("bearer {token}"));
    }
    request = request.header(http::header::CONTENT_LENGTH, notification.payload().len());

    request
        .body(())
        .map_err(|e| Error::stream(format!("request build: {e}")))
}

/// Write the payload, honoring the peer's flow-control window.
async fn write_body(body: &mut h2::SendStream<Bytes>, payload: Bytes, shared: &Shared) -> Result<()> {
    if payload.is_empty() {
        return body
            .send_data(payload, true)
            .map_err(|e| shared.submission_error(e));
    }

    let mut remaining = payload;
    body.reserve_capacity(remaining.len());
    while !remaining.is_empty() {
        let granted = std::future::poll_fn(|cx| body.poll_capacity(cx))
            .await
            .ok_or_else(|| Error::stream("stream closed while awaiting window capacity"))?
            .map_err(|e| shared.submission_error(e))?;
        let chunk = remaining.split_to(granted.min(remaining.len()));
        let end_of_stream = remaining.is_empty();
        body.send_data(chunk, end_of_stream)
            .map_err(|e| shared.submission_error(e))?;
    }
    Ok(())
}

/// Poll the `h2` connection to completion, sampling the peer's advertised
/// stream limit on every wakeup.
fn spawn_driver(shared: Arc<Shared>, connection: h2::client::Connection<IoStream, Bytes>) {
    tokio::spawn(async move {
        let mut connection = Box::pin(connection);
        let driven = std::future::poll_fn(|cx| {
            let advertised = connection.max_concurrent_send_streams();
            if advertised != usize::MAX
                && shared.max_streams.swap(advertised, Ordering::Relaxed) != advertised
            {
                // The peer's SETTINGS changed the stream limit; parked
                // acquirers may now have capacity.
                shared.events.notify_waiters();
            }
            connection.as_mut().poll(cx)
        });

        tokio::select! {
            result = driven => match result {
                Ok(()) => shared.close(CloseCause::Transport("connection closed by peer".into())),
                Err(e) => {
                    warn!(connection = shared.id, error = %e, "connection terminated");
                    shared.close(CloseCause::Transport(format!("connection lost: {e}")));
                }
            },
            _ = shared.shutdown.cancelled() => shared.close(CloseCause::Local),
        }
    });
}

/// PING after `interval` of idleness; close with IdleTimeout when the ACK
/// does not arrive within `ack_timeout`.
fn spawn_keepalive(
    shared: Arc<Shared>,
    mut ping_pong: PingPong,
    interval: Duration,
    ack_timeout: Duration,
) {
    tokio::spawn(async move {
        loop {
            let idle = shared.idle_for();
            let wait = interval.saturating_sub(idle);
            tokio::select! {
                _ = shared.shutdown.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
            if shared.idle_for() < interval {
                continue;
            }

            match timeout(ack_timeout, ping_pong.ping(Ping::opaque())).await {
                Ok(Ok(_pong)) => shared.touch(),
                Ok(Err(e)) => {
                    debug!(connection = shared.id, error = %e, "keepalive ping failed");
                    shared.close(CloseCause::Transport(format!("ping failed: {e}")));
                    return;
                }
                Err(_) => {
                    warn!(connection = shared.id, "keepalive ping timed out");
                    shared.close(CloseCause::IdleTimeout);
                    return;
                }
            }
        }
    });
}
