//! Session cache.
//!
//! A disposable projection of the token store:
//!
//! - `users/<id>/<token-hash>` → `true` for a live token, `false` for a
//!   revoked one
//! - `users/<id>` → [`UserSnapshot`]
//!
//! Access-token flags live no longer than the token itself; refresh flags
//! and user snapshots use the configured default TTL. The cache is never
//! authoritative: every failure is logged and treated as a miss.
//!
//! Revocation writes a `false` flag instead of deleting the key, and live
//! flags are only ever written with [`CacheStore::set_if_absent`]. A refill
//! racing a revocation therefore cannot bring the revoked token back.
//!
//! Writes are staged as [`CacheEffects`] while a transaction is open and
//! applied only after it commits.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use moka::Expiry;
use moka::future::Cache;
use thiserror::Error;

use marketstall_core::{TokenKind, UserId};

use crate::models::UserSnapshot;

/// Errors reported by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// A cached value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    Flag(bool),
    User(UserSnapshot),
}

/// Key-value store with per-entry TTL.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError>;

    async fn set(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<(), CacheError>;

    /// Write `value` unless the key already holds one. Returns whether it
    /// was written.
    async fn set_if_absent(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

// =============================================================================
// Moka adapter
// =============================================================================

#[derive(Debug, Clone)]
struct Entry {
    value: CacheValue,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process [`CacheStore`] backed by `moka`.
#[derive(Clone)]
pub struct MokaCacheStore {
    cache: Cache<String, Entry>,
}

impl MokaCacheStore {
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }
}

#[async_trait]
impl CacheStore for MokaCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<(), CacheError> {
        self.cache.insert(key.to_owned(), Entry { value, ttl }).await;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let entry = self
            .cache
            .entry_by_ref(key)
            .or_insert(Entry { value, ttl })
            .await;
        Ok(entry.is_fresh())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}

// =============================================================================
// Staged writes
// =============================================================================

#[derive(Debug, Clone)]
enum Effect {
    CacheToken {
        user: UserSnapshot,
        kind: TokenKind,
        token_hash: String,
        /// Token expiry (unix seconds).
        expires_at: i64,
    },
    RevokeToken {
        user_id: UserId,
        kind: TokenKind,
        token_hash: String,
    },
    EvictUser(UserId),
}

/// Cache writes collected during a transaction, applied after commit.
///
/// Dropping it without [`SessionCache::apply`] discards the writes, which is
/// what a rolled-back transaction needs.
#[derive(Debug, Default)]
#[must_use]
pub struct CacheEffects {
    effects: Vec<Effect>,
}

impl CacheEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a token as live and refresh the user snapshot.
    pub fn cache_token(
        &mut self,
        user: &UserSnapshot,
        kind: TokenKind,
        token_hash: &str,
        expires_at: i64,
    ) {
        self.effects.push(Effect::CacheToken {
            user: user.clone(),
            kind,
            token_hash: token_hash.to_owned(),
            expires_at,
        });
    }

    /// Mark a token as revoked.
    pub fn revoke_token(&mut self, user_id: UserId, kind: TokenKind, token_hash: &str) {
        self.effects.push(Effect::RevokeToken {
            user_id,
            kind,
            token_hash: token_hash.to_owned(),
        });
    }

    pub fn evict_user(&mut self, user_id: UserId) {
        self.effects.push(Effect::EvictUser(user_id));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

// =============================================================================
// Session cache
// =============================================================================

fn user_key(user_id: UserId) -> String {
    format!("users/{user_id}")
}

fn token_key(user_id: UserId, token_hash: &str) -> String {
    format!("users/{user_id}/{token_hash}")
}

/// Typed view over a [`CacheStore`].
#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn CacheStore>,
    access_ttl: Duration,
    default_ttl: Duration,
}

impl SessionCache {
    /// `access_ttl` caps access-token flags; `default_ttl` applies to
    /// refresh-token flags and user snapshots.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, access_ttl: Duration, default_ttl: Duration) -> Self {
        Self {
            store,
            access_ttl,
            default_ttl,
        }
    }

    /// Resolve a cached session.
    ///
    /// Returns the user only when both the token flag and the user snapshot
    /// are present.
    pub async fn lookup(&self, user_id: UserId, token_hash: &str) -> Option<UserSnapshot> {
        match self.store.get(&token_key(user_id, token_hash)).await {
            Ok(Some(CacheValue::Flag(true))) => {}
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user_id, "Session cache read failed");
                return None;
            }
        }

        match self.store.get(&user_key(user_id)).await {
            Ok(Some(CacheValue::User(user))) if user.id == user_id => Some(user),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user_id, "Session cache read failed");
                None
            }
        }
    }

    /// Apply staged writes. Failures are logged and skipped.
    pub async fn apply(&self, effects: CacheEffects) {
        for effect in effects.effects {
            let result = match effect {
                Effect::CacheToken {
                    user,
                    kind,
                    token_hash,
                    expires_at,
                } => self.write_token(user, kind, &token_hash, expires_at).await,
                Effect::RevokeToken {
                    user_id,
                    kind,
                    token_hash,
                } => {
                    // Outlives any live flag the token could still get.
                    self.store
                        .set(
                            &token_key(user_id, &token_hash),
                            CacheValue::Flag(false),
                            self.flag_ttl(kind),
                        )
                        .await
                }
                Effect::EvictUser(user_id) => self.store.delete(&user_key(user_id)).await,
            };

            if let Err(e) = result {
                tracing::warn!(error = %e, "Session cache write failed");
            }
        }
    }

    async fn write_token(
        &self,
        user: UserSnapshot,
        kind: TokenKind,
        token_hash: &str,
        expires_at: i64,
    ) -> Result<(), CacheError> {
        let ttl = match kind {
            TokenKind::Access => {
                let remaining = u64::try_from(expires_at - Utc::now().timestamp()).unwrap_or(0);
                self.access_ttl.min(Duration::from_secs(remaining))
            }
            TokenKind::Refresh => self.default_ttl,
        };
        if ttl.is_zero() {
            return Ok(());
        }

        let key = token_key(user.id, token_hash);
        let user_key = user_key(user.id);
        self.store
            .set(&user_key, CacheValue::User(user), self.default_ttl)
            .await?;
        // A revoked marker already in place wins.
        self.store
            .set_if_absent(&key, CacheValue::Flag(true), ttl)
            .await?;
        Ok(())
    }

    const fn flag_ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.default_ttl,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use marketstall_core::{Email, Role};

    use super::*;

    /// A cache whose every operation fails.
    pub(crate) struct BrokenCache;

    #[async_trait]
    impl CacheStore for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<CacheValue>, CacheError> {
            Err(CacheError::Unavailable("down".to_owned()))
        }

        async fn set(
            &self,
            _key: &str,
            _value: CacheValue,
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".to_owned()))
        }

        async fn set_if_absent(
            &self,
            _key: &str,
            _value: CacheValue,
            _ttl: Duration,
        ) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("down".to_owned()))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".to_owned()))
        }
    }

    fn user() -> UserSnapshot {
        UserSnapshot {
            id: UserId::new(4),
            email: Email::parse("u@test.com").unwrap(),
            role: Role::Customer,
        }
    }

    fn session_cache(store: Arc<dyn CacheStore>) -> SessionCache {
        SessionCache::new(store, Duration::from_secs(60), Duration::from_secs(86_400))
    }

    fn in_an_hour() -> i64 {
        Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn test_key_layout() {
        assert_eq!(user_key(UserId::new(4)), "users/4");
        assert_eq!(token_key(UserId::new(4), "ab12"), "users/4/ab12");

        let store = Arc::new(MokaCacheStore::new(100));
        let cache = session_cache(store.clone());
        let mut effects = CacheEffects::new();
        effects.cache_token(&user(), TokenKind::Access, "ab12", in_an_hour());
        cache.apply(effects).await;

        assert_eq!(store.get("users/4/ab12").await.unwrap(), Some(CacheValue::Flag(true)));
        assert_eq!(store.get("users/4").await.unwrap(), Some(CacheValue::User(user())));
    }

    #[tokio::test]
    async fn test_lookup_after_cache_then_revoke() {
        let cache = session_cache(Arc::new(MokaCacheStore::new(100)));
        let mut effects = CacheEffects::new();
        effects.cache_token(&user(), TokenKind::Refresh, "r1", in_an_hour());
        cache.apply(effects).await;
        assert_eq!(cache.lookup(UserId::new(4), "r1").await, Some(user()));
        assert_eq!(cache.lookup(UserId::new(4), "other").await, None);

        let mut effects = CacheEffects::new();
        effects.revoke_token(UserId::new(4), TokenKind::Refresh, "r1");
        cache.apply(effects).await;
        assert_eq!(cache.lookup(UserId::new(4), "r1").await, None);
    }

    #[tokio::test]
    async fn test_late_refill_cannot_undo_revocation() {
        let store = Arc::new(MokaCacheStore::new(100));
        let cache = session_cache(store.clone());

        let mut revoked = CacheEffects::new();
        revoked.revoke_token(UserId::new(4), TokenKind::Access, "a1");
        cache.apply(revoked).await;

        // A verifier that read the record before it was deleted refills now.
        let mut refill = CacheEffects::new();
        refill.cache_token(&user(), TokenKind::Access, "a1", in_an_hour());
        cache.apply(refill).await;

        assert_eq!(store.get("users/4/a1").await.unwrap(), Some(CacheValue::Flag(false)));
        assert_eq!(cache.lookup(UserId::new(4), "a1").await, None);
    }

    #[tokio::test]
    async fn test_set_if_absent_keeps_existing_value() {
        let store = MokaCacheStore::new(100);
        let ttl = Duration::from_secs(60);
        assert!(store.set_if_absent("k", CacheValue::Flag(false), ttl).await.unwrap());
        assert!(!store.set_if_absent("k", CacheValue::Flag(true), ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(CacheValue::Flag(false)));
    }

    #[tokio::test]
    async fn test_expired_access_token_is_not_cached() {
        let cache = session_cache(Arc::new(MokaCacheStore::new(100)));
        let mut effects = CacheEffects::new();
        effects.cache_token(&user(), TokenKind::Access, "old", Utc::now().timestamp() - 1);
        cache.apply(effects).await;
        assert_eq!(cache.lookup(UserId::new(4), "old").await, None);
    }

    #[tokio::test]
    async fn test_flag_without_user_snapshot_is_a_miss() {
        let store = Arc::new(MokaCacheStore::new(100));
        let cache = session_cache(store.clone());
        let mut effects = CacheEffects::new();
        effects.cache_token(&user(), TokenKind::Access, "a1", in_an_hour());
        effects.evict_user(UserId::new(4));
        cache.apply(effects).await;

        assert_eq!(store.get("users/4/a1").await.unwrap(), Some(CacheValue::Flag(true)));
        assert_eq!(cache.lookup(UserId::new(4), "a1").await, None);
    }

    #[tokio::test]
    async fn test_broken_backend_is_a_miss() {
        let cache = session_cache(Arc::new(BrokenCache));
        let mut effects = CacheEffects::new();
        effects.cache_token(&user(), TokenKind::Access, "a1", in_an_hour());
        cache.apply(effects).await;
        assert_eq!(cache.lookup(UserId::new(4), "a1").await, None);
    }
}
