//! Caching for resolved principals and for the hot null-site rule slice.
//!
//! Both caches are owned objects constructed once per process and injected
//! through `AppState` — no module-level singletons. Entries are replaced
//! atomically per key; readers only ever see a fully-populated snapshot.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

use crate::authz::principal::AuthInfo;
use crate::authz::rule::Rule;

#[derive(Clone)]
enum FillState {
    Pending,
    Ready(Arc<AuthInfo>),
    Failed(String),
}

struct Entry {
    created: Instant,
    rx: watch::Receiver<FillState>,
}

/// Per-login cache of resolved [`AuthInfo`] snapshots with a bounded
/// freshness window.
///
/// Concurrent resolves for the same login share one in-flight computation:
/// the first caller spawns the fill task and every waiter watches the same
/// channel. The fill runs to completion on its own task, so a caller that
/// abandons its request neither cancels the computation nor starves other
/// waiters.
pub struct AuthCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl AuthCache {
    pub fn new(ttl: Duration) -> Self {
        AuthCache { ttl, entries: Mutex::new(HashMap::new()) }
    }

    /// Return the cached snapshot for `login`, or run `load` (once, shared
    /// across concurrent callers) to populate it. The error string is the
    /// already-sanitized message; the underlying store failure was logged
    /// where it happened.
    pub async fn resolve<F, Fut>(&self, login: &str, load: F) -> Result<Arc<AuthInfo>, String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AuthInfo, String>> + Send + 'static,
    {
        let mut rx = {
            let mut entries = self.entries.lock().await;
            match entries.get(login) {
                Some(entry) if entry.created.elapsed() < self.ttl => entry.rx.clone(),
                _ => {
                    let (tx, rx) = watch::channel(FillState::Pending);
                    entries.insert(
                        login.to_string(),
                        Entry { created: Instant::now(), rx: rx.clone() },
                    );
                    let fut = load();
                    let owner = login.to_string();
                    tokio::spawn(async move {
                        let state = match fut.await {
                            Ok(info) => FillState::Ready(Arc::new(info)),
                            Err(message) => {
                                tracing::error!(login = %owner, "auth resolve failed");
                                FillState::Failed(message)
                            }
                        };
                        let _ = tx.send(state);
                    });
                    rx
                }
            }
        };

        loop {
            let state = rx.borrow().clone();
            match state {
                FillState::Ready(info) => return Ok(info),
                FillState::Failed(message) => {
                    // drop the failed entry so the next caller retries
                    self.remove_if_same(login, &rx).await;
                    return Err(message);
                }
                FillState::Pending => {
                    if rx.changed().await.is_err() {
                        self.remove_if_same(login, &rx).await;
                        return Err("permission resolution was interrupted".to_string());
                    }
                }
            }
        }
    }

    /// Drop one login's entry, or every entry when `login` is None. Called
    /// by the mutation facade before a mutation is acknowledged.
    pub async fn invalidate(&self, login: Option<&str>) {
        let mut entries = self.entries.lock().await;
        match login {
            Some(login) => {
                entries.remove(login);
            }
            None => entries.clear(),
        }
    }

    async fn remove_if_same(&self, login: &str, rx: &watch::Receiver<FillState>) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(login) {
            if entry.rx.same_channel(rx) {
                entries.remove(login);
            }
        }
    }
}

/// Short-TTL cache for site rules whose scope is "all sites". These are
/// read on nearly every site-scoped check across all principals, and an
/// admin granting or revoking one should become visible quickly; mutations
/// additionally clear this cache proactively rather than waiting out the
/// TTL.
pub struct GlobalSiteRuleCache {
    ttl: Duration,
    slot: Mutex<Option<(Instant, Arc<Vec<Rule>>)>>,
}

impl GlobalSiteRuleCache {
    pub fn new(ttl: Duration) -> Self {
        GlobalSiteRuleCache { ttl, slot: Mutex::new(None) }
    }

    /// Cached slice, or fetch under the slot lock (which makes concurrent
    /// callers share the one fetch).
    pub async fn get_or_fetch<F, Fut, E>(&self, fetch: F) -> Result<Arc<Vec<Rule>>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Rule>, E>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some((created, rules)) = &*slot {
            if created.elapsed() < self.ttl {
                return Ok(rules.clone());
            }
        }
        let fresh = Arc::new(fetch().await?);
        *slot = Some((Instant::now(), fresh.clone()));
        Ok(fresh)
    }

    pub async fn clear(&self) {
        *self.slot.lock().await = None;
    }
}
