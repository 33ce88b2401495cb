//! Authentication service.
//!
//! Password accounts plus the token flows built on [`TokenLifecycle`]:
//! sign-up, sign-in, refresh, sign-out, password change and session
//! revocation. [`AuthService::check_token`] is the verifier every
//! authenticated request goes through.

mod error;
mod password;

pub use error::AuthError;
pub use password::{hash_password, validate_password};

use std::sync::Arc;

use tracing::instrument;

use marketstall_core::{Email, Role, TokenKind, UserId};

use crate::db::{RepositoryError, Store};
use crate::models::{Principal, User, UserSnapshot};
use crate::services::session_cache::CacheEffects;
use crate::services::tokens::{IssuedAccess, IssuedPair, TokenError, TokenLifecycle, codec};

use password::password_matches;

/// Authentication service.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store>,
    tokens: TokenLifecycle,
    password_min_length: usize,
}

impl AuthService {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(
        store: Arc<dyn Store>,
        tokens: TokenLifecycle,
        password_min_length: usize,
    ) -> Self {
        Self {
            store,
            tokens,
            password_min_length,
        }
    }

    #[must_use]
    pub const fn tokens(&self) -> &TokenLifecycle {
        &self.tokens
    }

    // =========================================================================
    // Verifier
    // =========================================================================

    /// Resolve the principal behind a presented token.
    ///
    /// A cache hit returns without touching the store. On a miss the token
    /// record must exist, so a revoked token is rejected even while its
    /// signature is still valid.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` or `AuthError::TokenExpired` if the
    /// token fails verification, `AuthError::TokenNotFound` if its record is
    /// gone.
    #[instrument(skip(self, token), fields(kind = %kind))]
    pub async fn check_token(&self, kind: TokenKind, token: &str) -> Result<Principal, AuthError> {
        let claims = self.tokens.codec().verify(token, kind)?;
        let token_hash = codec::hash(token);

        if let Some(user) = self.tokens.cache().lookup(claims.sub, &token_hash).await {
            return Ok(Principal {
                user,
                kind,
                token_hash,
            });
        }

        let mut tx = self.store.begin().await?;
        tx.find_token(claims.sub, kind, &token_hash)
            .await?
            .ok_or(AuthError::TokenNotFound)?;
        let user = tx
            .user_by_id(claims.sub)
            .await?
            .ok_or(AuthError::TokenNotFound)?
            .snapshot();
        drop(tx);

        let mut effects = CacheEffects::new();
        effects.cache_token(&user, kind, &token_hash, claims.exp);
        self.tokens.cache().apply(effects).await;

        Ok(Principal {
            user,
            kind,
            token_hash,
        })
    }

    /// Whether the token behind `principal` still has its record.
    ///
    /// Long-lived connections poll this to notice sign-out and revocation
    /// after their initial check.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the store fails.
    pub async fn session_alive(&self, principal: &Principal) -> Result<bool, AuthError> {
        let user_id = principal.user_id();
        if self
            .tokens
            .cache()
            .lookup(user_id, &principal.token_hash)
            .await
            .is_some()
        {
            return Ok(true);
        }

        let mut tx = self.store.begin().await?;
        Ok(tx
            .find_token(user_id, principal.kind, &principal.token_hash)
            .await?
            .is_some())
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Register a new customer.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password is too short.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError> {
        self.create_user(email, password, Role::Customer).await
    }

    /// Create a user with an explicit role.
    ///
    /// # Errors
    ///
    /// Same as [`AuthService::sign_up`].
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password, self.password_min_length)?;
        let password_hash = hash_password(password)?;

        let mut tx = self.store.begin().await?;
        let user = tx
            .create_user(&email, &password_hash, role)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, role = %role, "User created");
        Ok(user)
    }

    /// The caller's account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the account was deleted.
    pub async fn current_user(&self, principal: &Principal) -> Result<User, AuthError> {
        let mut tx = self.store.begin().await?;
        tx.user_by_id(principal.user_id())
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    // =========================================================================
    // Token flows
    // =========================================================================

    /// Verify credentials and issue a new token pair.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for an unknown email or a
    /// wrong password.
    #[instrument(skip(self, password))]
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(UserSnapshot, IssuedPair), AuthError> {
        let email = Email::parse(email)?;

        let mut tx = self.store.begin().await?;
        let (user, password_hash) = tx
            .password_hash_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        drop(tx);

        if !password_matches(password, &password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let user = user.snapshot();
        let pair = self.tokens.create_pair(&user).await?;
        tracing::info!(user_id = %user.id, "Signed in");
        Ok((user, pair))
    }

    /// Mint a new access token from a refresh token.
    ///
    /// If the client still holds its previous access token it is presented
    /// too. That token may be expired but must not be forged, revoked or
    /// paired with another refresh token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken`, `AuthError::TokenExpired` or
    /// `AuthError::TokenNotFound` for a refresh token that does not
    /// authenticate, and `AuthError::TokenNotFound` for a presented access
    /// token whose record is gone.
    #[instrument(skip_all)]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        access_token: Option<&str>,
    ) -> Result<IssuedAccess, AuthError> {
        let principal = self.check_token(TokenKind::Refresh, refresh_token).await?;
        let user_id = principal.user_id();

        let mut tx = self.store.begin().await?;
        let refresh = tx
            .find_token(user_id, TokenKind::Refresh, &principal.token_hash)
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        if let Some(access_token) = access_token {
            let claims = match self.tokens.codec().verify(access_token, TokenKind::Access) {
                Ok(claims) | Err(TokenError::Expired { claims }) => claims,
                Err(e) => return Err(e.into()),
            };
            if claims.sub != user_id {
                return Err(AuthError::TokenNotFound);
            }
            let access = tx
                .find_token(user_id, TokenKind::Access, &codec::hash(access_token))
                .await?
                .ok_or(AuthError::TokenNotFound)?;
            if access.paired_token_id != Some(refresh.id) {
                return Err(AuthError::TokenNotFound);
            }
        }

        let mut effects = CacheEffects::new();
        let issued = self
            .tokens
            .refresh_access_token_in(tx.as_mut(), &principal.user, refresh.id, &mut effects)
            .await?;
        tx.commit().await?;
        self.tokens.cache().apply(effects).await;

        tracing::info!(user_id = %user_id, "Access token refreshed");
        Ok(issued)
    }

    /// Revoke the caller's token pair.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenNotFound` if the access record is already gone.
    #[instrument(skip_all, fields(user_id = %principal.user_id()))]
    pub async fn sign_out(&self, principal: &Principal) -> Result<(), AuthError> {
        let mut tx = self.store.begin().await?;
        let refresh_id = tx
            .find_token(principal.user_id(), TokenKind::Access, &principal.token_hash)
            .await?
            .and_then(|record| record.paired_token_id)
            .ok_or(AuthError::TokenNotFound)?;

        let mut effects = CacheEffects::new();
        self.tokens
            .delete_pair_in(tx.as_mut(), refresh_id, &mut effects)
            .await?;
        tx.commit().await?;
        self.tokens.cache().apply(effects).await;

        tracing::info!("Signed out");
        Ok(())
    }

    /// Change the caller's password and replace every session with a new pair.
    ///
    /// The hash update and the token reset commit together.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::IncorrectPassword` if `current` does not verify,
    /// `AuthError::PasswordReused` if `new` equals it, and
    /// `AuthError::WeakPassword` if `new` is too short.
    #[instrument(skip_all, fields(user_id = %principal.user_id()))]
    pub async fn change_password(
        &self,
        principal: &Principal,
        current: &str,
        new: &str,
    ) -> Result<IssuedPair, AuthError> {
        validate_password(new, self.password_min_length)?;
        let user_id = principal.user_id();

        let mut tx = self.store.begin().await?;
        let stored_hash = tx
            .password_hash_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !password_matches(current, &stored_hash) {
            return Err(AuthError::IncorrectPassword);
        }
        if password_matches(new, &stored_hash) {
            return Err(AuthError::PasswordReused);
        }

        let new_hash = hash_password(new)?;
        tx.update_password(user_id, &new_hash).await?;

        let mut effects = CacheEffects::new();
        let pair = self
            .tokens
            .reset_and_create_pair_in(tx.as_mut(), &principal.user, &mut effects)
            .await?;
        tx.commit().await?;
        self.tokens.cache().apply(effects).await;

        tracing::info!("Password changed, sessions reset");
        Ok(pair)
    }

    /// Revoke every token of a user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` for an unknown user.
    #[instrument(skip(self))]
    pub async fn revoke_all_sessions(&self, user_id: UserId) -> Result<usize, AuthError> {
        let mut tx = self.store.begin().await?;
        tx.user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let mut effects = CacheEffects::new();
        let revoked = self
            .tokens
            .revoke_all_in(tx.as_mut(), user_id, &mut effects)
            .await?;
        effects.evict_user(user_id);
        tx.commit().await?;
        self.tokens.cache().apply(effects).await;

        tracing::info!(revoked, "Sessions revoked");
        Ok(revoked)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use secrecy::SecretString;
    use tokio::sync::Notify;

    use super::*;
    use crate::db::{Fault, MemoryStore};
    use crate::services::session_cache::tests::BrokenCache;
    use crate::services::session_cache::{
        CacheError, CacheStore, CacheValue, MokaCacheStore, SessionCache,
    };
    use crate::services::tokens::TokenCodec;

    fn service_with(
        store: &MemoryStore,
        access_ttl: Duration,
        cache: Arc<dyn CacheStore>,
    ) -> AuthService {
        let codec = TokenCodec::new(
            SecretString::from("k3Y!r8#Qz@1vLm^p7&Xw2*Nd5$Tg9%Hb"),
            access_ttl,
            Duration::from_secs(3600),
        );
        let cache = SessionCache::new(cache, access_ttl, Duration::from_secs(86_400));
        let store: Arc<dyn Store> = Arc::new(store.clone());
        let tokens = TokenLifecycle::new(Arc::clone(&store), Arc::new(codec), cache);
        AuthService::new(store, tokens, 2)
    }

    fn service(store: &MemoryStore) -> AuthService {
        service_with(
            store,
            Duration::from_secs(600),
            Arc::new(MokaCacheStore::new(1000)),
        )
    }

    async fn signed_in(auth: &AuthService) -> (UserSnapshot, IssuedPair) {
        auth.sign_up("u@test.com", "pw").await.unwrap();
        auth.sign_in("u@test.com", "pw").await.unwrap()
    }

    #[tokio::test]
    async fn test_sign_up_sign_in_check_sign_out() {
        let store = MemoryStore::new();
        let auth = service(&store);

        let user = auth.sign_up("u@test.com", "pw").await.unwrap();
        let (_, pair) = auth.sign_in("u@test.com", "pw").await.unwrap();

        let principal = auth
            .check_token(TokenKind::Access, &pair.access_token)
            .await
            .unwrap();
        assert_eq!(principal.user_id(), user.id);

        auth.sign_out(&principal).await.unwrap();
        assert!(matches!(
            auth.check_token(TokenKind::Access, &pair.access_token).await,
            Err(AuthError::TokenNotFound)
        ));
        assert!(matches!(
            auth.check_token(TokenKind::Refresh, &pair.refresh_token).await,
            Err(AuthError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn test_sign_up_rejects_duplicates_and_short_passwords() {
        let store = MemoryStore::new();
        let auth = service(&store);
        auth.sign_up("u@test.com", "pw").await.unwrap();

        assert!(matches!(
            auth.sign_up("U@TEST.com", "other").await,
            Err(AuthError::UserAlreadyExists)
        ));
        assert!(matches!(
            auth.sign_up("v@test.com", "p").await,
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            auth.sign_up("not-an-email", "pw").await,
            Err(AuthError::InvalidEmail(_))
        ));
    }

    #[tokio::test]
    async fn test_sign_in_rejects_bad_credentials() {
        let store = MemoryStore::new();
        let auth = service(&store);
        auth.sign_up("u@test.com", "pw").await.unwrap();

        assert!(matches!(
            auth.sign_in("u@test.com", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.sign_in("nobody@test.com", "pw").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_swapped_kind_rejected_before_store_lookup() {
        let store = MemoryStore::new();
        let auth = service(&store);
        let (_, pair) = signed_in(&auth).await;

        store.fail(Fault::Begin);
        assert!(matches!(
            auth.check_token(TokenKind::Refresh, &pair.access_token).await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            auth.check_token(TokenKind::Access, &pair.refresh_token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_store() {
        let store = MemoryStore::new();
        let auth = service(&store);
        let (user, pair) = signed_in(&auth).await;

        store.fail(Fault::Begin);
        store.fail(Fault::FindToken);
        let principal = auth
            .check_token(TokenKind::Access, &pair.access_token)
            .await
            .unwrap();
        assert_eq!(principal.user, user);
    }

    #[tokio::test]
    async fn test_revocation_beats_warm_cache() {
        let store = MemoryStore::new();
        let auth = service(&store);
        let (_, pair) = signed_in(&auth).await;
        let principal = auth
            .check_token(TokenKind::Access, &pair.access_token)
            .await
            .unwrap();

        auth.sign_out(&principal).await.unwrap();

        assert!(matches!(
            auth.check_token(TokenKind::Access, &pair.access_token).await,
            Err(AuthError::TokenNotFound)
        ));
    }

    /// Moka cache that can hold back the next live-flag write.
    struct GatedCache {
        inner: MokaCacheStore,
        armed: AtomicBool,
        paused: Notify,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl CacheStore for GatedCache {
        async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<(), CacheError> {
            self.inner.set(key, value, ttl).await
        }

        async fn set_if_absent(
            &self,
            key: &str,
            value: CacheValue,
            ttl: Duration,
        ) -> Result<bool, CacheError> {
            if value == CacheValue::Flag(true) && self.armed.swap(false, Ordering::SeqCst) {
                self.paused.notify_one();
                self.release.notified().await;
            }
            self.inner.set_if_absent(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_sign_out_during_cache_refill_stays_revoked() {
        let store = MemoryStore::new();
        let gate = Arc::new(GatedCache {
            inner: MokaCacheStore::new(100),
            armed: AtomicBool::new(false),
            paused: Notify::new(),
            release: Notify::new(),
        });
        let auth = service_with(&store, Duration::from_secs(600), gate.clone());
        let (user, pair) = signed_in(&auth).await;
        let principal = auth
            .check_token(TokenKind::Access, &pair.access_token)
            .await
            .unwrap();

        // Cold cache, so the next check reads the store and refills.
        gate.inner
            .delete(&format!("users/{}/{}", user.id, codec::hash(&pair.access_token)))
            .await
            .unwrap();
        gate.armed.store(true, Ordering::SeqCst);

        let checker = auth.clone();
        let token = pair.access_token.clone();
        let in_flight =
            tokio::spawn(async move { checker.check_token(TokenKind::Access, &token).await });

        gate.paused.notified().await;
        auth.sign_out(&principal).await.unwrap();
        gate.release.notify_one();

        assert_eq!(in_flight.await.unwrap().unwrap().user_id(), user.id);
        assert!(matches!(
            auth.check_token(TokenKind::Access, &pair.access_token).await,
            Err(AuthError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn test_store_is_truth_when_cache_is_down() {
        let store = MemoryStore::new();
        let auth = service_with(&store, Duration::from_secs(600), Arc::new(BrokenCache));
        let (user, pair) = signed_in(&auth).await;

        let principal = auth
            .check_token(TokenKind::Access, &pair.access_token)
            .await
            .unwrap();
        assert_eq!(principal.user, user);

        auth.sign_out(&principal).await.unwrap();
        assert!(matches!(
            auth.check_token(TokenKind::Access, &pair.access_token).await,
            Err(AuthError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rotates_access_token() {
        let store = MemoryStore::new();
        let auth = service(&store);
        let (_, pair) = signed_in(&auth).await;

        let issued = auth
            .refresh(&pair.refresh_token, Some(&pair.access_token))
            .await
            .unwrap();
        assert_eq!(issued.refresh_id, pair.refresh_id);

        assert!(matches!(
            auth.check_token(TokenKind::Access, &pair.access_token).await,
            Err(AuthError::TokenNotFound)
        ));
        auth.check_token(TokenKind::Access, &issued.access_token)
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let (user, _) = tx
            .password_hash_by_email(&Email::parse("u@test.com").unwrap())
            .await
            .unwrap()
            .unwrap();
        let paired: Vec<_> = tx
            .tokens_for_user(user.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.paired_token_id == Some(pair.refresh_id))
            .collect();
        assert_eq!(paired.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_access_token_refreshes_exactly_once() {
        let store = MemoryStore::new();
        let auth = service_with(&store, Duration::ZERO, Arc::new(MokaCacheStore::new(100)));
        let (_, pair) = signed_in(&auth).await;

        assert!(matches!(
            auth.check_token(TokenKind::Access, &pair.access_token).await,
            Err(AuthError::TokenExpired)
        ));

        auth.refresh(&pair.refresh_token, Some(&pair.access_token))
            .await
            .unwrap();
        assert!(matches!(
            auth.refresh(&pair.refresh_token, Some(&pair.access_token)).await,
            Err(AuthError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rejects_foreign_access_token() {
        let store = MemoryStore::new();
        let auth = service(&store);
        let (_, first) = signed_in(&auth).await;
        let (_, second) = auth.sign_in("u@test.com", "pw").await.unwrap();

        assert!(matches!(
            auth.refresh(&first.refresh_token, Some(&second.access_token)).await,
            Err(AuthError::TokenNotFound)
        ));
        assert!(matches!(
            auth.refresh(&first.refresh_token, Some("garbage")).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_change_password_revokes_every_token() {
        let store = MemoryStore::new();
        let auth = service(&store);
        let (_, first) = signed_in(&auth).await;
        let (_, second) = auth.sign_in("u@test.com", "pw").await.unwrap();
        let principal = auth
            .check_token(TokenKind::Access, &first.access_token)
            .await
            .unwrap();

        assert!(matches!(
            auth.change_password(&principal, "wrong", "new-pw").await,
            Err(AuthError::IncorrectPassword)
        ));
        assert!(matches!(
            auth.change_password(&principal, "pw", "pw").await,
            Err(AuthError::PasswordReused)
        ));

        let fresh = auth
            .change_password(&principal, "pw", "new-pw")
            .await
            .unwrap();

        for stale in [&first, &second] {
            assert!(matches!(
                auth.check_token(TokenKind::Access, &stale.access_token).await,
                Err(AuthError::TokenNotFound)
            ));
            assert!(matches!(
                auth.check_token(TokenKind::Refresh, &stale.refresh_token).await,
                Err(AuthError::TokenNotFound)
            ));
        }
        auth.check_token(TokenKind::Access, &fresh.access_token)
            .await
            .unwrap();
        assert!(matches!(
            auth.sign_in("u@test.com", "pw").await,
            Err(AuthError::InvalidCredentials)
        ));
        auth.sign_in("u@test.com", "new-pw").await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_password_change_keeps_old_password() {
        let store = MemoryStore::new();
        let auth = service(&store);
        let (_, pair) = signed_in(&auth).await;
        let principal = auth
            .check_token(TokenKind::Access, &pair.access_token)
            .await
            .unwrap();

        store.fail(Fault::InsertToken);
        assert!(auth.change_password(&principal, "pw", "new-pw").await.is_err());
        store.heal(Fault::InsertToken);

        auth.sign_in("u@test.com", "pw").await.unwrap();
        auth.check_token(TokenKind::Access, &pair.access_token)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_revoke_all_sessions() {
        let store = MemoryStore::new();
        let auth = service(&store);
        let (user, pair) = signed_in(&auth).await;
        auth.sign_in("u@test.com", "pw").await.unwrap();

        assert_eq!(auth.revoke_all_sessions(user.id).await.unwrap(), 4);
        assert!(matches!(
            auth.check_token(TokenKind::Access, &pair.access_token).await,
            Err(AuthError::TokenNotFound)
        ));
        assert!(matches!(
            auth.revoke_all_sessions(UserId::new(9999)).await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_session_alive_follows_sign_out_and_revocation() {
        let store = MemoryStore::new();
        let auth = service(&store);
        let (user, pair) = signed_in(&auth).await;
        let principal = auth
            .check_token(TokenKind::Access, &pair.access_token)
            .await
            .unwrap();
        assert!(auth.session_alive(&principal).await.unwrap());

        let (_, other) = auth.sign_in("u@test.com", "pw").await.unwrap();
        let other = auth
            .check_token(TokenKind::Access, &other.access_token)
            .await
            .unwrap();

        auth.sign_out(&principal).await.unwrap();
        assert!(!auth.session_alive(&principal).await.unwrap());
        assert!(auth.session_alive(&other).await.unwrap());

        auth.revoke_all_sessions(user.id).await.unwrap();
        assert!(!auth.session_alive(&other).await.unwrap());
    }

    #[tokio::test]
    async fn test_session_alive_reads_store_when_cache_is_down() {
        let store = MemoryStore::new();
        let auth = service_with(&store, Duration::from_secs(600), Arc::new(BrokenCache));
        let (_, pair) = signed_in(&auth).await;
        let principal = auth
            .check_token(TokenKind::Access, &pair.access_token)
            .await
            .unwrap();
        assert!(auth.session_alive(&principal).await.unwrap());

        auth.sign_out(&principal).await.unwrap();
        assert!(!auth.session_alive(&principal).await.unwrap());
    }
}
