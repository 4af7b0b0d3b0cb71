//! The single authority for "do we have a usable access token, and if
//! not, obtain one."
//!
//! `TokenSessionManager` owns the in-memory access token, the persisted
//! token material (through [`TokenStore`]), and the one shared slot for
//! an in-flight refresh. Concurrent callers that need a refresh all
//! await the same network operation; the refresh endpoint is hit at
//! most once no matter how many requests go stale together.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use super::expiry;
use crate::api::{AuthError, RefreshGateway};
use crate::models::TokenPair;
use crate::state::{AuthNotifier, SESSION_EXPIRED_MESSAGE};
use crate::store::{StoreError, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

/// Handle to the one outstanding refresh operation. `Shared` lets every
/// joiner await the same eventual result, which is why [`AuthError`]
/// and [`TokenPair`] are `Clone`.
type SharedRefresh = Shared<BoxFuture<'static, Result<TokenPair, AuthError>>>;

/// Session manager for access/refresh tokens.
/// Clone is cheap - all state lives behind one Arc.
#[derive(Clone)]
pub struct TokenSessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn TokenStore>,
    gateway: Arc<dyn RefreshGateway>,
    notifier: Arc<dyn AuthNotifier>,
    /// In-memory access token. The lock is held only to read or assign,
    /// never across I/O.
    access_token: Mutex<Option<String>>,
    /// Slot for the currently outstanding refresh, if any. The lock
    /// guards the check-and-set of the slot; the network call itself
    /// runs outside it.
    in_flight: AsyncMutex<Option<SharedRefresh>>,
}

impl TokenSessionManager {
    pub fn new(
        store: Arc<dyn TokenStore>,
        gateway: Arc<dyn RefreshGateway>,
        notifier: Arc<dyn AuthNotifier>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                gateway,
                notifier,
                access_token: Mutex::new(None),
                in_flight: AsyncMutex::new(None),
            }),
        }
    }

    /// The in-memory access token, verbatim. No expiry judgment, no I/O.
    pub fn get_access_token(&self) -> Option<String> {
        self.inner.memory().clone()
    }

    /// The persisted refresh token. Store errors are logged and treated
    /// as "no token" so the caller sees a clean "must log in" signal.
    pub async fn get_refresh_token(&self) -> Option<String> {
        match self.inner.store.get(REFRESH_TOKEN_KEY).await {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "failed to read refresh token from store");
                None
            }
        }
    }

    /// Replace both tokens: access token in memory and both tokens in
    /// the durable store. Each write is a full-value replacement, so a
    /// reader interleaving between them still observes a consistent
    /// session.
    pub async fn save_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), AuthError> {
        self.inner.persist(access_token, refresh_token).await?;
        Ok(())
    }

    /// Drop the in-memory token and remove all persisted entries. Safe
    /// to call when nothing is stored.
    pub async fn clear_tokens(&self) -> Result<(), AuthError> {
        self.inner.wipe().await?;
        Ok(())
    }

    /// The primary read path for the outbound-request layer.
    ///
    /// 1. A fresh in-memory token is returned with zero I/O.
    /// 2. Otherwise a fresh persisted token is promoted to memory - the
    ///    process-restart fast path, no network involved.
    /// 3. With no refresh token stored there is no session: `None`.
    /// 4. Otherwise refresh, joining any refresh already in flight.
    pub async fn ensure_valid_access_token(&self) -> Option<String> {
        if let Some(token) = self.get_access_token() {
            if !expiry::is_expired(&token) {
                return Some(token);
            }
        }

        match self.inner.store.get(ACCESS_TOKEN_KEY).await {
            Ok(Some(token)) if !expiry::is_expired(&token) => {
                debug!("promoting persisted access token to memory");
                *self.inner.memory() = Some(token.clone());
                return Some(token);
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "failed to read persisted access token"),
        }

        let refresh_token = self.get_refresh_token().await?;
        match self.refresh_single_flight(refresh_token).await {
            Ok(pair) => Some(pair.access_token),
            Err(err) => {
                debug!(error = %err, "refresh failed; no usable access token");
                None
            }
        }
    }

    /// Forced refresh after a server rejected a request as unauthorized.
    /// Skips the expiry judgment but still coalesces with any refresh
    /// already in flight.
    pub async fn refresh_after_unauthorized(&self) -> Result<TokenPair, AuthError> {
        let refresh_token = self
            .get_refresh_token()
            .await
            .ok_or(AuthError::NoRefreshToken)?;
        self.refresh_single_flight(refresh_token).await
    }

    /// Either start a refresh or attach to the one in flight, then
    /// await its shared outcome.
    async fn refresh_single_flight(&self, refresh_token: String) -> Result<TokenPair, AuthError> {
        let operation = {
            let mut slot = self.inner.in_flight.lock().await;
            match slot.as_ref() {
                Some(existing) => {
                    debug!("joining refresh already in flight");
                    existing.clone()
                }
                None => {
                    let operation = Inner::run_refresh(Arc::clone(&self.inner), refresh_token)
                        .boxed()
                        .shared();
                    *slot = Some(operation.clone());
                    operation
                }
            }
        };

        let result = operation.clone().await;

        // Only clear the slot if it still holds the operation we just
        // awaited; a newer operation must not be discarded by a late
        // finisher.
        let mut slot = self.inner.in_flight.lock().await;
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&operation)) {
            *slot = None;
        }
        drop(slot);

        result
    }
}

impl Inner {
    fn memory(&self) -> MutexGuard<'_, Option<String>> {
        match self.access_token.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The refresh token goes first: it is the irreplaceable credential,
    /// and a failed access-token write must never leave a server-rotated
    /// refresh token unpersisted. The access token is recoverable by
    /// refreshing again.
    async fn persist(&self, access_token: &str, refresh_token: &str) -> Result<(), StoreError> {
        *self.memory() = Some(access_token.to_string());
        self.store.put(REFRESH_TOKEN_KEY, refresh_token).await?;
        self.store.put(ACCESS_TOKEN_KEY, access_token).await
    }

    /// Clears memory and both persisted entries together, so a cleared
    /// session can never serve a stale persisted access token.
    async fn wipe(&self) -> Result<(), StoreError> {
        *self.memory() = None;
        self.store.remove(ACCESS_TOKEN_KEY).await?;
        self.store.remove(REFRESH_TOKEN_KEY).await
    }

    /// The body of the shared refresh operation. Owns clones of the
    /// collaborators so it can outlive the caller that started it.
    async fn run_refresh(
        inner: Arc<Inner>,
        refresh_token: String,
    ) -> Result<TokenPair, AuthError> {
        debug!("starting token refresh");
        match inner.gateway.refresh(&refresh_token).await {
            Ok(pair) => {
                if let Err(err) = inner.persist(&pair.access_token, &pair.refresh_token).await {
                    warn!(error = %err, "refreshed tokens could not be persisted");
                }
                inner.notifier.set_authenticated(None);
                Ok(pair)
            }
            Err(AuthError::InvalidRefreshToken) => {
                warn!("refresh token rejected by server; terminating session");
                if let Err(err) = inner.wipe().await {
                    warn!(error = %err, "failed to clear tokens");
                }
                inner
                    .notifier
                    .set_unauthenticated(Some(SESSION_EXPIRED_MESSAGE));
                Err(AuthError::InvalidRefreshToken)
            }
            // Transient, mapping and unknown failures leave the stored
            // tokens in place for a later retry.
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::auth::expiry::token_expiring_at;
    use crate::state::{AppEffect, AppState, AuthStateBroadcaster};
    use crate::store::MemoryTokenStore;

    fn init_tracing() {
        use tracing_subscriber::EnvFilter;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    }

    fn fresh_token() -> String {
        token_expiring_at(Utc::now().timestamp() + 3600)
    }

    fn expired_token() -> String {
        token_expiring_at(Utc::now().timestamp() - 3600)
    }

    struct StubGateway {
        calls: AtomicUsize,
        delay: Duration,
        outcome: Result<TokenPair, AuthError>,
    }

    impl StubGateway {
        fn returning(outcome: Result<TokenPair, AuthError>) -> Arc<Self> {
            Self::with_delay(outcome, Duration::ZERO)
        }

        fn with_delay(outcome: Result<TokenPair, AuthError>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                outcome,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RefreshGateway for StubGateway {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.outcome.clone()
        }
    }

    /// Store wrapper that counts traffic, for asserting the fast paths
    /// really skip the store.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryTokenStore,
        reads: AtomicUsize,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl TokenStore for CountingStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.put(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.remove(key).await
        }

        async fn clear(&self) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.clear().await
        }
    }

    /// Store whose access-token writes fail, to exercise partial
    /// persistence during a refresh.
    #[derive(Default)]
    struct AccessWriteFailingStore {
        inner: MemoryTokenStore,
    }

    #[async_trait]
    impl TokenStore for AccessWriteFailingStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
            if key == ACCESS_TOKEN_KEY {
                return Err(StoreError::Backend("disk full".to_string()));
            }
            self.inner.put(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key).await
        }

        async fn clear(&self) -> Result<(), StoreError> {
            self.inner.clear().await
        }
    }

    fn manager_with(
        store: Arc<dyn TokenStore>,
        gateway: Arc<StubGateway>,
    ) -> (TokenSessionManager, AuthStateBroadcaster) {
        let broadcaster = AuthStateBroadcaster::new();
        let notifier: Arc<dyn AuthNotifier> = Arc::new(broadcaster.clone());
        let manager = TokenSessionManager::new(store, gateway, notifier);
        (manager, broadcaster)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_callers_share_one_refresh() {
        init_tracing();
        let store = Arc::new(MemoryTokenStore::new());
        store
            .put(REFRESH_TOKEN_KEY, "rt-1")
            .await
            .expect("seed store");

        let new_access = fresh_token();
        let gateway = StubGateway::with_delay(
            Ok(TokenPair {
                access_token: new_access.clone(),
                refresh_token: "rt-2".to_string(),
            }),
            Duration::from_millis(50),
        );
        let (manager, broadcaster) = manager_with(store.clone(), gateway.clone());

        let started = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let manager = manager.clone();
            handles.push(tokio::spawn(
                async move { manager.ensure_valid_access_token().await },
            ));
        }
        for handle in handles {
            let token = handle.await.expect("task panicked");
            assert_eq!(token.as_deref(), Some(new_access.as_str()));
        }

        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(gateway.calls(), 1);
        assert_eq!(
            store
                .get(REFRESH_TOKEN_KEY)
                .await
                .expect("store read")
                .as_deref(),
            Some("rt-2")
        );
        assert_eq!(
            broadcaster.current(),
            AppState::Authenticated { user_id: None }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_failures_share_one_outcome() {
        let store = Arc::new(MemoryTokenStore::new());
        store
            .put(REFRESH_TOKEN_KEY, "rt-1")
            .await
            .expect("seed store");

        let gateway = StubGateway::with_delay(
            Err(AuthError::Transient("connection reset".to_string())),
            Duration::from_millis(50),
        );
        let (manager, _broadcaster) = manager_with(store.clone(), gateway.clone());

        let mut handles = Vec::new();
        for _ in 0..3 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.refresh_after_unauthorized().await
            }));
        }
        for handle in handles {
            let result = handle.await.expect("task panicked");
            assert_eq!(
                result,
                Err(AuthError::Transient("connection reset".to_string()))
            );
        }

        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_memory_fast_path_skips_store_and_gateway() {
        let store = Arc::new(CountingStore::default());
        let gateway = StubGateway::returning(Err(AuthError::Transient("offline".to_string())));
        let (manager, _broadcaster) = manager_with(store.clone(), gateway.clone());

        let access = fresh_token();
        manager
            .save_tokens(&access, "rt-1")
            .await
            .expect("save failed");

        let reads_before = store.reads.load(Ordering::SeqCst);
        let writes_before = store.writes.load(Ordering::SeqCst);

        let token = manager.ensure_valid_access_token().await;
        assert_eq!(token.as_deref(), Some(access.as_str()));
        assert_eq!(gateway.calls(), 0);
        assert_eq!(store.reads.load(Ordering::SeqCst), reads_before);
        assert_eq!(store.writes.load(Ordering::SeqCst), writes_before);
    }

    #[tokio::test]
    async fn test_restart_promotes_persisted_access_token() {
        let store = Arc::new(MemoryTokenStore::new());
        let persisted = fresh_token();
        store
            .put(ACCESS_TOKEN_KEY, &persisted)
            .await
            .expect("seed store");
        store
            .put(REFRESH_TOKEN_KEY, "rt-1")
            .await
            .expect("seed store");

        // Gateway would fail; the persisted token must make it unreachable.
        let gateway = StubGateway::returning(Err(AuthError::Transient("offline".to_string())));
        let (manager, _broadcaster) = manager_with(store, gateway.clone());

        let token = manager.ensure_valid_access_token().await;
        assert_eq!(token.as_deref(), Some(persisted.as_str()));
        assert_eq!(gateway.calls(), 0);

        // Promoted to memory: a second call is pure fast path.
        assert_eq!(manager.get_access_token().as_deref(), Some(persisted.as_str()));
    }

    #[tokio::test]
    async fn test_expired_persisted_token_triggers_refresh() {
        let store = Arc::new(MemoryTokenStore::new());
        store
            .put(ACCESS_TOKEN_KEY, &expired_token())
            .await
            .expect("seed store");
        store
            .put(REFRESH_TOKEN_KEY, "rt-1")
            .await
            .expect("seed store");

        let new_access = fresh_token();
        let gateway = StubGateway::returning(Ok(TokenPair {
            access_token: new_access.clone(),
            refresh_token: "rt-2".to_string(),
        }));
        let (manager, _broadcaster) = manager_with(store, gateway.clone());

        let token = manager.ensure_valid_access_token().await;
        assert_eq!(token.as_deref(), Some(new_access.as_str()));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_session_returns_none_without_network() {
        let store = Arc::new(MemoryTokenStore::new());
        let gateway = StubGateway::returning(Err(AuthError::Transient("unreached".to_string())));
        let (manager, broadcaster) = manager_with(store, gateway.clone());

        assert!(manager.ensure_valid_access_token().await.is_none());
        assert_eq!(gateway.calls(), 0);
        // "No session" is not a failure; the state is untouched.
        assert_eq!(broadcaster.current(), AppState::Bootstrapping);
    }

    #[tokio::test]
    async fn test_invalid_refresh_token_destroys_session() {
        let store = Arc::new(MemoryTokenStore::new());
        store
            .put(ACCESS_TOKEN_KEY, &expired_token())
            .await
            .expect("seed store");
        store
            .put(REFRESH_TOKEN_KEY, "rt-1")
            .await
            .expect("seed store");

        let gateway = StubGateway::returning(Err(AuthError::InvalidRefreshToken));
        let (manager, broadcaster) = manager_with(store.clone(), gateway);
        let mut effects = broadcaster.effects();

        let result = manager.refresh_after_unauthorized().await;
        assert_eq!(result, Err(AuthError::InvalidRefreshToken));

        assert!(manager.get_refresh_token().await.is_none());
        assert!(store
            .get(ACCESS_TOKEN_KEY)
            .await
            .expect("store read")
            .is_none());
        assert!(manager.get_access_token().is_none());
        assert_eq!(broadcaster.current(), AppState::Unauthenticated);
        assert_eq!(
            effects.recv().await.expect("effect channel closed"),
            AppEffect::ShowMessage("Session expired".to_string())
        );
    }

    #[tokio::test]
    async fn test_transient_failure_preserves_session() {
        let store = Arc::new(MemoryTokenStore::new());
        store
            .put(REFRESH_TOKEN_KEY, "rt-1")
            .await
            .expect("seed store");

        let gateway = StubGateway::returning(Err(AuthError::Transient("timeout".to_string())));
        let (manager, broadcaster) = manager_with(store.clone(), gateway);

        let result = manager.refresh_after_unauthorized().await;
        assert!(matches!(result, Err(AuthError::Transient(_))));

        assert_eq!(
            store
                .get(REFRESH_TOKEN_KEY)
                .await
                .expect("store read")
                .as_deref(),
            Some("rt-1")
        );
        assert_eq!(broadcaster.current(), AppState::Bootstrapping);
    }

    #[tokio::test]
    async fn test_forced_refresh_without_token_fails_cleanly() {
        let store = Arc::new(MemoryTokenStore::new());
        let gateway = StubGateway::returning(Err(AuthError::Transient("unreached".to_string())));
        let (manager, _broadcaster) = manager_with(store, gateway.clone());

        let result = manager.refresh_after_unauthorized().await;
        assert_eq!(result, Err(AuthError::NoRefreshToken));
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_forced_refresh_bypasses_expiry_and_slot_is_reusable() {
        let store = Arc::new(MemoryTokenStore::new());
        let rotated = fresh_token();
        let gateway = StubGateway::returning(Ok(TokenPair {
            access_token: rotated.clone(),
            refresh_token: "rt-2".to_string(),
        }));
        let (manager, _broadcaster) = manager_with(store, gateway.clone());

        // A perfectly fresh session still refreshes when forced.
        manager
            .save_tokens(&fresh_token(), "rt-1")
            .await
            .expect("save failed");
        let pair = manager
            .refresh_after_unauthorized()
            .await
            .expect("forced refresh failed");
        assert_eq!(pair.access_token, rotated);
        assert_eq!(gateway.calls(), 1);

        // The slot was cleared; a second forced refresh reaches the
        // gateway again instead of joining a finished operation.
        manager
            .refresh_after_unauthorized()
            .await
            .expect("second refresh failed");
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_survives_access_write_failure() {
        let store = Arc::new(AccessWriteFailingStore::default());
        store
            .inner
            .put(REFRESH_TOKEN_KEY, "rt-1")
            .await
            .expect("seed store");

        let new_access = fresh_token();
        let gateway = StubGateway::returning(Ok(TokenPair {
            access_token: new_access.clone(),
            refresh_token: "rt-2".to_string(),
        }));
        let (manager, _broadcaster) = manager_with(store.clone(), gateway);

        let pair = manager
            .refresh_after_unauthorized()
            .await
            .expect("refresh failed");
        assert_eq!(pair.refresh_token, "rt-2");

        // The server already invalidated rt-1; even though the
        // access-token write failed, the rotated refresh token must be
        // the one on disk.
        assert_eq!(
            store
                .get(REFRESH_TOKEN_KEY)
                .await
                .expect("store read")
                .as_deref(),
            Some("rt-2")
        );
        // The session stays usable from memory.
        assert_eq!(manager.get_access_token().as_deref(), Some(new_access.as_str()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dropped_callers_leave_refresh_recoverable() {
        let store = Arc::new(MemoryTokenStore::new());
        store
            .put(REFRESH_TOKEN_KEY, "rt-1")
            .await
            .expect("seed store");

        let new_access = fresh_token();
        let gateway = StubGateway::with_delay(
            Ok(TokenPair {
                access_token: new_access.clone(),
                refresh_token: "rt-2".to_string(),
            }),
            Duration::from_millis(100),
        );
        let (manager, _broadcaster) = manager_with(store, gateway.clone());

        // Two callers join the refresh, then both are torn down while
        // the network call is still outstanding.
        let mut handles = Vec::new();
        for _ in 0..2 {
            let manager = manager.clone();
            handles.push(tokio::spawn(
                async move { manager.ensure_valid_access_token().await },
            ));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        for handle in &handles {
            handle.abort();
        }

        // A later caller must not find the slot wedged: it attaches to
        // the still-pending operation (or starts one) and completes.
        let token = manager.ensure_valid_access_token().await;
        assert_eq!(token.as_deref(), Some(new_access.as_str()));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_clear_tokens_is_idempotent() {
        let store = Arc::new(MemoryTokenStore::new());
        let gateway = StubGateway::returning(Err(AuthError::Transient("unreached".to_string())));
        let (manager, _broadcaster) = manager_with(store, gateway);

        manager.clear_tokens().await.expect("clear on empty failed");

        manager
            .save_tokens(&fresh_token(), "rt-1")
            .await
            .expect("save failed");
        manager.clear_tokens().await.expect("clear failed");

        assert!(manager.get_access_token().is_none());
        assert!(manager.get_refresh_token().await.is_none());

        manager.clear_tokens().await.expect("second clear failed");
    }
}
