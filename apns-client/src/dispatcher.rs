#![forbid(unsafe_code)]

//! Request dispatch: connection selection, token attachment, the single
//! expired-token retry, and metrics fan-out.
//!
//! Notification validation happens at build time, so every value reaching
//! [`Dispatcher::submit`] is already well-formed; the dispatcher's job is
//! pairing it with a connection and a fresh provider token. Per
//! submission, the send happens before the outcome resolves and the
//! outcome resolves before its metrics fan-out; no ordering is promised
//! across submissions.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::timeout;
use tracing::debug;

use apns_auth::{CachedToken, TokenCache};
use apns_core::{ClientConfig, Error, Notification, Outcome, Result};

use crate::metrics::{Acknowledgement, MetricsListener};
use crate::pool::Pool;

/// How requests are authenticated.
pub(crate) enum AuthMode {
    /// Every request carries `authorization: bearer <jwt>`.
    Token(TokenCache),
    /// The connection presents a client certificate; no bearer header.
    Certificate,
}

pub(crate) struct Dispatcher {
    pool: Pool,
    auth: AuthMode,
    metrics: Arc<dyn MetricsListener>,
    config: ClientConfig,
}

impl Dispatcher {
    pub(crate) fn new(
        pool: Pool,
        auth: AuthMode,
        metrics: Arc<dyn MetricsListener>,
        config: ClientConfig,
    ) -> Self {
        Self {
            pool,
            auth,
            metrics,
            config,
        }
    }

    /// Deliver one notification and resolve its outcome.
    pub(crate) async fn submit(&self, notification: &Notification) -> Result<Outcome> {
        let started = Instant::now();
        let result = match self.config.submission_deadline {
            Some(deadline) => timeout(deadline, self.execute(notification))
                .await
                .unwrap_or(Err(Error::TimedOut)),
            None => self.execute(notification).await,
        };

        let ack = match &result {
            Ok(Outcome::Accepted { .. }) => Acknowledgement::Accepted,
            Ok(Outcome::Rejected { reason, .. }) => Acknowledgement::Rejected(reason),
            Err(e) => Acknowledgement::Failed(e),
        };
        self.metrics.notification_acknowledged(ack, started.elapsed());
        result
    }

    async fn execute(&self, notification: &Notification) -> Result<Outcome> {
        let (first, token) = self.attempt(notification).await?;

        // An expired provider token is retried exactly once on a fresh
        // token; the second verdict is surfaced verbatim. No other
        // rejection is retried.
        let expired = matches!(
            &first,
            Outcome::Rejected { reason, .. } if reason.is_token_expired()
        );
        match (expired, &self.auth, token) {
            (true, AuthMode::Token(cache), Some(seen)) => {
                debug!(topic = notification.topic(), "provider token expired, retrying once");
                if let Some(team) = cache.default_team() {
                    cache.invalidate(team, &seen).await;
                }
                let (second, _) = self.attempt(notification).await?;
                Ok(second)
            }
            _ => Ok(first),
        }
    }

    /// One send attempt: acquire, sign, write, await the verdict.
    async fn attempt(
        &self,
        notification: &Notification,
    ) -> Result<(Outcome, Option<Arc<CachedToken>>)> {
        let topic = notification.topic();

        let endpoint = match self.pool.acquire().await {
            Ok(ep) => ep,
            Err(e) => {
                self.metrics.write_failure(topic);
                return Err(e);
            }
        };

        let token = match &self.auth {
            AuthMode::Token(cache) => {
                let team = cache
                    .default_team()
                    .ok_or_else(|| Error::auth("no signing key configured"))?;
                match cache.token(team).await {
                    Ok(token) => Some(token),
                    Err(e) => {
                        self.metrics.write_failure(topic);
                        return Err(e);
                    }
                }
            }
            AuthMode::Certificate => None,
        };

        let bearer = token.as_ref().map(|t| t.encoded.as_str());
        let pending = match endpoint.send(notification, bearer).await {
            Ok(pending) => pending,
            Err(e) => {
                self.metrics.write_failure(topic);
                return Err(e);
            }
        };
        self.metrics.notification_sent(topic);

        let outcome = pending.outcome().await?;
        Ok((outcome, token))
    }
}
