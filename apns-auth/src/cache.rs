#![forbid(unsafe_code)]

//! Per-team provider token cache.
//!
//! Tokens are minted lazily on first use and replaced once older than the
//! refresh interval. Minting is serialized per team through that team's
//! async mutex; distinct teams mint in parallel. All connections of a
//! client share one cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::debug;

use apns_core::{Error, Result};

use crate::jwt;
use crate::key::SigningKey;

/// Default token refresh interval.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(55 * 60);

/// One minted token and its issue time (unix seconds).
#[derive(Debug)]
pub struct CachedToken {
    /// Unix-seconds issue time; matches the `iat` claim.
    pub issued_at: u64,
    /// Encoded `header.claims.signature` string.
    pub encoded: String,
}

struct TeamSlot {
    key: Arc<SigningKey>,
    token: Mutex<Option<Arc<CachedToken>>>,
}

/// Cache of provider tokens, keyed by team id.
pub struct TokenCache {
    teams: HashMap<String, TeamSlot>,
    refresh_interval: Duration,
    default_team: Option<String>,
}

impl TokenCache {
    /// Build a cache over the given signing keys.
    ///
    /// The first key's team becomes the default team used by clients that
    /// carry a single signing key.
    pub fn new(keys: impl IntoIterator<Item = SigningKey>, refresh_interval: Duration) -> Self {
        let mut teams = HashMap::new();
        let mut default_team = None;
        for key in keys {
            let team = key.team_id().to_owned();
            default_team.get_or_insert_with(|| team.clone());
            teams.insert(
                team,
                TeamSlot {
                    key: Arc::new(key),
                    token: Mutex::new(None),
                },
            );
        }
        Self {
            teams,
            refresh_interval,
            default_team,
        }
    }

    /// Cache over a single signing key with the default refresh interval.
    pub fn single(key: SigningKey) -> Self {
        Self::new([key], REFRESH_INTERVAL)
    }

    /// Team id used when the caller does not name one.
    pub fn default_team(&self) -> Option<&str> {
        self.default_team.as_deref()
    }

    /// Return a token for `team_id` no older than the refresh interval.
    pub async fn token(&self, team_id: &str) -> Result<Arc<CachedToken>> {
        self.token_at(team_id, unix_now()).await
    }

    /// Clock-injected variant of [`TokenCache::token`] for tests and tooling.
    pub async fn token_at(&self, team_id: &str, now: u64) -> Result<Arc<CachedToken>> {
        let slot = self
            .teams
            .get(team_id)
            .ok_or_else(|| Error::auth(format!("no signing key for team {team_id}")))?;

        let mut guard = slot.token.lock().await;
        if let Some(existing) = guard.as_ref() {
            if now.saturating_sub(existing.issued_at) < self.refresh_interval.as_secs() {
                return Ok(Arc::clone(existing));
            }
            debug!(team = team_id, issued_at = existing.issued_at, "provider token stale, re-minting");
        }

        let encoded = jwt::mint(&slot.key, now)?;
        let token = Arc::new(CachedToken {
            issued_at: now,
            encoded,
        });
        *guard = Some(Arc::clone(&token));
        Ok(token)
    }

    /// Drop the cached entry for `team_id`, but only if it still holds the
    /// token the caller observed. A concurrent re-mint is left in place.
    pub async fn invalidate(&self, team_id: &str, seen: &Arc<CachedToken>) {
        if let Some(slot) = self.teams.get(team_id) {
            let mut guard = slot.token.lock().await;
            if guard.as_ref().is_some_and(|current| Arc::ptr_eq(current, seen)) {
                debug!(team = team_id, "invalidating provider token");
                *guard = None;
            }
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa;

    fn key_for(team: &str) -> SigningKey {
        SigningKey::new(
            "KEY1234567",
            team,
            ecdsa::SigningKey::random(&mut rand::rngs::OsRng),
        )
    }

    #[tokio::test]
    async fn fresh_token_is_reused() {
        let cache = TokenCache::new([key_for("TEAM000001")], REFRESH_INTERVAL);
        let a = cache.token_at("TEAM000001", 1000).await.unwrap();
        let b = cache.token_at("TEAM000001", 1000 + 60).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn stale_token_is_replaced() {
        let cache = TokenCache::new([key_for("TEAM000001")], REFRESH_INTERVAL);
        let a = cache.token_at("TEAM000001", 1000).await.unwrap();
        let later = 1000 + REFRESH_INTERVAL.as_secs();
        let b = cache.token_at("TEAM000001", later).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.issued_at, later);
        // Invariant: now - iat < refresh interval.
        assert!(later - b.issued_at < REFRESH_INTERVAL.as_secs());
    }

    #[tokio::test]
    async fn invalidate_only_drops_the_seen_token() {
        let cache = TokenCache::new([key_for("TEAM000001")], REFRESH_INTERVAL);
        let a = cache.token_at("TEAM000001", 1000).await.unwrap();

        // A concurrent caller already re-minted; the old holder's
        // invalidation must not discard the fresh token.
        let later = 1000 + REFRESH_INTERVAL.as_secs();
        let b = cache.token_at("TEAM000001", later).await.unwrap();
        cache.invalidate("TEAM000001", &a).await;
        let c = cache.token_at("TEAM000001", later + 1).await.unwrap();
        assert!(Arc::ptr_eq(&b, &c));

        // Invalidating the current token forces a re-mint.
        cache.invalidate("TEAM000001", &c).await;
        let d = cache.token_at("TEAM000001", later + 2).await.unwrap();
        assert!(!Arc::ptr_eq(&c, &d));
    }

    #[tokio::test]
    async fn concurrent_same_team_callers_share_one_mint() {
        let cache = Arc::new(TokenCache::new([key_for("TEAM000001")], REFRESH_INTERVAL));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.token_at("TEAM000001", 1000).await.unwrap()
            }));
        }
        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap());
        }
        for token in &tokens[1..] {
            assert!(Arc::ptr_eq(&tokens[0], token));
        }
    }

    #[tokio::test]
    async fn teams_are_independent() {
        let cache = TokenCache::new(
            [key_for("TEAMAAAAA1"), key_for("TEAMBBBBB2")],
            REFRESH_INTERVAL,
        );
        let a = cache.token_at("TEAMAAAAA1", 1000).await.unwrap();
        let b = cache.token_at("TEAMBBBBB2", 1000).await.unwrap();
        assert_ne!(a.encoded, b.encoded);
        assert_eq!(cache.default_team(), Some("TEAMAAAAA1"));
    }

    #[tokio::test]
    async fn unknown_team_is_an_error() {
        let cache = TokenCache::new([key_for("TEAM000001")], REFRESH_INTERVAL);
        assert!(cache.token_at("NOSUCHTEAM", 1000).await.is_err());
    }
}
