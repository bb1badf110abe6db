use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::JwkSet;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum KeySetError {
    #[error("failed to fetch signing keys: {0}")]
    Fetch(#[from] reqwest::Error),
}

/// Cached signing-key set fetched from the issuer's JWKS endpoint.
///
/// The cache is lazily populated and refreshed whole: a successful fetch
/// swaps in a new immutable snapshot rather than mutating the current one,
/// so concurrent readers always see a complete key set. Readers take the
/// read lock only long enough to clone an `Arc`.
pub struct KeySetCache {
    jwks_url: String,
    ttl: Duration,
    http: reqwest::Client,
    snapshot: RwLock<Option<Snapshot>>,
}

#[derive(Clone)]
struct Snapshot {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

impl Snapshot {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

impl KeySetCache {
    pub fn new(jwks_url: impl Into<String>, ttl: Duration, http: reqwest::Client) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            ttl,
            http,
            snapshot: RwLock::new(None),
        }
    }

    /// Current key set, refreshed from the JWKS endpoint when the cached
    /// snapshot has expired. Fails closed: an expired cache plus a failed
    /// fetch is an error, not a fallback to stale keys.
    pub async fn current(&self) -> Result<Arc<JwkSet>, KeySetError> {
        {
            let guard = self.snapshot.read().await;
            if let Some(snap) = guard.as_ref().filter(|s| s.is_fresh(self.ttl)) {
                return Ok(snap.keys.clone());
            }
        }

        self.refresh().await
    }

    async fn refresh(&self) -> Result<Arc<JwkSet>, KeySetError> {
        let mut guard = self.snapshot.write().await;

        // another request may have refreshed while we waited on the lock
        if let Some(snap) = guard.as_ref().filter(|s| s.is_fresh(self.ttl)) {
            return Ok(snap.keys.clone());
        }

        tracing::debug!(url = %self.jwks_url, "refreshing signing-key set");
        let keys: JwkSet = self
            .http
            .get(&self.jwks_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let keys = Arc::new(keys);
        *guard = Some(Snapshot {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });

        Ok(keys)
    }

    /// Seed the cache with a known key set, bypassing the fetch.
    #[cfg(test)]
    pub(crate) async fn prime(&self, keys: JwkSet) {
        let mut guard = self.snapshot.write().await;
        *guard = Some(Snapshot {
            keys: Arc::new(keys),
            fetched_at: Instant::now(),
        });
    }
}
