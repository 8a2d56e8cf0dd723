#![forbid(unsafe_code)]

//! Fixed-size connection pool.
//!
//! Each slot runs a supervisor task: connect, publish the endpoint, wait
//! for it to close, reconnect with full-jitter exponential backoff. The
//! pool therefore maintains exactly `concurrent_connections` non-closed
//! endpoints at steady state. Selection picks the least-loaded Ready
//! endpoint, breaking ties toward the least-recently-selected one;
//! callers without a candidate park on a bounded wait queue and are woken
//! by stream completions and readiness changes.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use apns_core::{ClientConfig, Error, Result};

use crate::connect::Connect;
use crate::connection::ConnectionEndpoint;
use crate::metrics::MetricsListener;

/// Exponential backoff with full jitter: each delay is uniform in
/// `[0, ceiling]` where the ceiling doubles per consecutive failure up to
/// the cap. A successful handshake resets it.
pub(crate) struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    pub(crate) fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    /// Current ceiling: `base * 2^attempt`, capped.
    pub(crate) fn ceiling(&self) -> Duration {
        let doubled = self
            .base
            .saturating_mul(1u32.checked_shl(self.attempt.min(16)).unwrap_or(u32::MAX));
        doubled.min(self.cap)
    }

    /// Sample the next delay and advance the attempt counter.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let ceiling = self.ceiling();
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(fastrand::u64(0..=ceiling.as_millis() as u64))
    }

    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }
}

struct Slot {
    endpoint: Option<Arc<ConnectionEndpoint>>,
}

struct PoolShared {
    config: ClientConfig,
    connector: Arc<dyn Connect>,
    metrics: Arc<dyn MetricsListener>,
    slots: Mutex<Vec<Slot>>,
    /// Wakeups for parked acquirers; endpoints also notify it on stream
    /// completion.
    events: Arc<Notify>,
    draining: AtomicBool,
    shutdown: CancellationToken,
    waiters: AtomicUsize,
    selection_clock: AtomicU64,
    next_connection_id: AtomicUsize,
}

impl PoolShared {
    fn open(&self) -> bool {
        !self.draining.load(Ordering::Acquire) && !self.shutdown.is_cancelled()
    }

    fn try_select(&self) -> Option<Arc<ConnectionEndpoint>> {
        let slots = self.slots.lock().ok()?;
        let chosen = slots
            .iter()
            .filter_map(|slot| slot.endpoint.as_ref())
            .filter(|ep| ep.is_available())
            .min_by_key(|ep| (ep.inflight(), ep.last_selected()))
            .cloned();
        drop(slots);
        if let Some(ep) = &chosen {
            ep.mark_selected(self.selection_clock.fetch_add(1, Ordering::Relaxed));
        }
        chosen
    }

    fn endpoints(&self) -> Vec<Arc<ConnectionEndpoint>> {
        self.slots
            .lock()
            .map(|slots| {
                slots
                    .iter()
                    .filter_map(|slot| slot.endpoint.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Handle to the pool; cheap to clone.
#[derive(Clone)]
pub(crate) struct Pool {
    shared: Arc<PoolShared>,
}

impl Pool {
    /// Build the pool, spawn one supervisor per slot, and wait until the
    /// first endpoint is Ready. Errors if every slot's initial connection
    /// attempt fails.
    pub(crate) async fn start(
        config: ClientConfig,
        connector: Arc<dyn Connect>,
        metrics: Arc<dyn MetricsListener>,
    ) -> Result<Self> {
        let size = config.concurrent_connections.max(1);
        let shared = Arc::new(PoolShared {
            config,
            connector,
            metrics,
            slots: Mutex::new((0..size).map(|_| Slot { endpoint: None }).collect()),
            events: Arc::new(Notify::new()),
            draining: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            waiters: AtomicUsize::new(0),
            selection_clock: AtomicU64::new(0),
            next_connection_id: AtomicUsize::new(0),
        });

        let (first_tx, mut first_rx) = mpsc::channel(size);
        for index in 0..size {
            tokio::spawn(run_slot(Arc::clone(&shared), index, first_tx.clone()));
        }
        drop(first_tx);

        let mut failures = 0;
        while let Some(result) = first_rx.recv().await {
            match result {
                Ok(()) => return Ok(Self { shared }),
                Err(e) => {
                    failures += 1;
                    if failures == size {
                        shared.shutdown.cancel();
                        return Err(e);
                    }
                }
            }
        }
        Err(Error::connection("pool startup aborted"))
    }

    /// Pick a Ready endpoint with spare stream capacity, parking on the
    /// bounded wait queue when none is available.
    pub(crate) async fn acquire(&self) -> Result<Arc<ConnectionEndpoint>> {
        let shared = &self.shared;
        loop {
            if !shared.open() {
                return Err(Error::ShuttingDown);
            }
            if let Some(ep) = shared.try_select() {
                return Ok(ep);
            }

            let parked = shared.waiters.fetch_add(1, Ordering::AcqRel);
            if parked >= shared.config.wait_queue_limit {
                shared.waiters.fetch_sub(1, Ordering::AcqRel);
                return Err(Error::NoReadyConnection("wait queue is full".into()));
            }

            let woken = shared.events.notified();
            tokio::pin!(woken);
            woken.as_mut().enable();

            // Re-check after registering interest so a wakeup between the
            // failed select and the park cannot be missed.
            if let Some(ep) = shared.try_select() {
                shared.waiters.fetch_sub(1, Ordering::AcqRel);
                return Ok(ep);
            }
            if !shared.open() {
                shared.waiters.fetch_sub(1, Ordering::AcqRel);
                return Err(Error::ShuttingDown);
            }

            tokio::select! {
                _ = woken => {}
                _ = shared.shutdown.cancelled() => {}
            }
            shared.waiters.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Stop accepting acquisitions and gracefully close every endpoint;
    /// resolves once all endpoints have drained their in-flight streams.
    pub(crate) async fn drain(&self) {
        self.shared.draining.store(true, Ordering::Release);
        self.shared.events.notify_waiters();

        let endpoints = self.shared.endpoints();
        info!(connections = endpoints.len(), "draining connection pool");
        let closes = endpoints.iter().map(|ep| ep.close(true));
        futures::future::join_all(closes).await;
    }

    /// Cancel everything immediately; in-flight submissions fail.
    pub(crate) fn hard_close(&self) {
        self.shared.draining.store(true, Ordering::Release);
        self.shared.shutdown.cancel();
        self.shared.events.notify_waiters();
    }

    /// Number of endpoints currently Ready.
    pub(crate) fn ready_count(&self) -> usize {
        self.shared
            .endpoints()
            .iter()
            .filter(|ep| ep.state() == crate::connection::ConnectionState::Ready)
            .count()
    }

    /// Sum of open stream bindings across all endpoints.
    pub(crate) fn total_inflight(&self) -> usize {
        self.shared.endpoints().iter().map(|ep| ep.inflight()).sum()
    }
}

/// Supervisor for one pool slot: connect, publish, wait for close,
/// reconnect with backoff while the pool stays open.
async fn run_slot(shared: Arc<PoolShared>, index: usize, first: mpsc::Sender<Result<()>>) {
    let mut backoff = Backoff::new(shared.config.backoff_base, shared.config.backoff_cap);
    let mut first = Some(first);

    while shared.open() {
        let id = shared.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let connected = ConnectionEndpoint::connect(
            id,
            shared.connector.as_ref(),
            &shared.config,
            Arc::clone(&shared.events),
            &shared.shutdown,
        )
        .await;

        match connected {
            Ok(endpoint) => {
                if !shared.open() {
                    // Drain raced with this connect attempt; the endpoint
                    // was never published, close it instead.
                    endpoint.close(false).await;
                    return;
                }
                backoff.reset();
                shared.metrics.connection_added();
                if let Ok(mut slots) = shared.slots.lock() {
                    slots[index].endpoint = Some(Arc::clone(&endpoint));
                }
                shared.events.notify_waiters();
                if let Some(tx) = first.take() {
                    let _ = tx.try_send(Ok(()));
                }

                endpoint.closed().await;

                if let Ok(mut slots) = shared.slots.lock() {
                    slots[index].endpoint = None;
                }
                shared.metrics.connection_removed();
                shared.events.notify_waiters();
                debug!(slot = index, connection = endpoint.id(), "endpoint closed");
            }
            Err(e) => {
                shared.metrics.connection_creation_failed();
                if let Some(tx) = first.take() {
                    let _ = tx.try_send(Err(e));
                } else {
                    warn!(slot = index, error = %e, "reconnect attempt failed");
                }
                let delay = backoff.next_delay();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shared.shutdown.cancelled() => return,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_ceiling_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(backoff.ceiling(), Duration::from_secs(1));
        let _ = backoff.next_delay();
        assert_eq!(backoff.ceiling(), Duration::from_secs(2));
        let _ = backoff.next_delay();
        assert_eq!(backoff.ceiling(), Duration::from_secs(4));
        for _ in 0..10 {
            let _ = backoff.next_delay();
        }
        assert_eq!(backoff.ceiling(), Duration::from_secs(60));
    }

    #[test]
    fn backoff_samples_stay_under_ceiling() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        for _ in 0..20 {
            let ceiling = backoff.ceiling();
            let delay = backoff.next_delay();
            assert!(delay <= ceiling, "{delay:?} > {ceiling:?}");
        }
    }

    #[test]
    fn backoff_reset_returns_to_base() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        for _ in 0..5 {
            let _ = backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.ceiling(), Duration::from_secs(1));
    }
}
