//! Token lifecycle.
//!
//! Creates, rotates and revokes access/refresh token pairs, keeping the token
//! store and the session cache in step.
//!
//! | Operation | Effect |
//! |---|---|
//! | [`create_pair`](TokenLifecycle::create_pair) | new REFRESH row, new ACCESS row paired to it |
//! | [`reset_and_create_pair_in`](TokenLifecycle::reset_and_create_pair_in) | delete every row of the user, then create a pair |
//! | [`refresh_access_token_in`](TokenLifecycle::refresh_access_token_in) | replace the ACCESS row paired to a refresh row |
//! | [`delete_pair`](TokenLifecycle::delete_pair) | delete a refresh row and its paired ACCESS row |
//!
//! Each `*_in` operation runs on a caller-owned transaction and stages its
//! cache writes into a [`CacheEffects`]; the caller applies them after
//! commit. The operations without the suffix open and commit their own
//! transaction.

pub mod codec;

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use marketstall_core::{TokenId, TokenKind, UserId};

use crate::db::{RepositoryError, Store, StoreTx};
use crate::models::{NewToken, TokenRecord, UserSnapshot};
use crate::services::session_cache::{CacheEffects, SessionCache};

pub use codec::{Claims, TokenCodec, TokenError};

/// Errors from token lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone)]
pub struct IssuedPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Record id of the refresh token.
    pub refresh_id: TokenId,
}

/// A freshly issued access token.
#[derive(Debug, Clone)]
pub struct IssuedAccess {
    pub access_token: String,
    /// Record id of the refresh token it is paired with.
    pub refresh_id: TokenId,
}

/// Orchestrates token pairs over the store and the session cache.
#[derive(Clone)]
pub struct TokenLifecycle {
    store: Arc<dyn Store>,
    codec: Arc<TokenCodec>,
    cache: SessionCache,
}

impl TokenLifecycle {
    #[must_use]
    pub const fn new(store: Arc<dyn Store>, codec: Arc<TokenCodec>, cache: SessionCache) -> Self {
        Self {
            store,
            codec,
            cache,
        }
    }

    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    #[must_use]
    pub const fn cache(&self) -> &SessionCache {
        &self.cache
    }

    // =========================================================================
    // Composable operations
    // =========================================================================

    /// Insert a refresh record and an access record paired to it.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError` if signing or persistence fails; the caller's
    /// transaction should then be discarded.
    pub async fn create_pair_in(
        &self,
        tx: &mut dyn StoreTx,
        user: &UserSnapshot,
        effects: &mut CacheEffects,
    ) -> Result<IssuedPair, LifecycleError> {
        let (refresh_token, refresh_claims) =
            self.codec.issue(user.id, &user.email, TokenKind::Refresh)?;
        let refresh_hash = codec::hash(&refresh_token);
        let refresh = tx
            .insert_token(NewToken {
                user_id: user.id,
                kind: TokenKind::Refresh,
                token_hash: &refresh_hash,
                paired_token_id: None,
            })
            .await?;

        let access = self.insert_access_in(tx, user, refresh.id, effects).await?;
        effects.cache_token(user, TokenKind::Refresh, &refresh_hash, refresh_claims.exp);

        Ok(IssuedPair {
            access_token: access.access_token,
            refresh_token,
            refresh_id: refresh.id,
        })
    }

    /// Delete every token of the user, then create a new pair.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError` if signing or persistence fails.
    pub async fn reset_and_create_pair_in(
        &self,
        tx: &mut dyn StoreTx,
        user: &UserSnapshot,
        effects: &mut CacheEffects,
    ) -> Result<IssuedPair, LifecycleError> {
        self.revoke_all_in(tx, user.id, effects).await?;
        self.create_pair_in(tx, user, effects).await
    }

    /// Replace the access token paired with `refresh_id`.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError` if signing or persistence fails.
    pub async fn refresh_access_token_in(
        &self,
        tx: &mut dyn StoreTx,
        user: &UserSnapshot,
        refresh_id: TokenId,
        effects: &mut CacheEffects,
    ) -> Result<IssuedAccess, LifecycleError> {
        let replaced = tx.delete_access_tokens_paired_to(refresh_id).await?;
        evict_all(&replaced, effects);
        self.insert_access_in(tx, user, refresh_id, effects).await
    }

    /// Delete a refresh record and the access record paired to it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` (wrapped) if the refresh record
    /// does not exist.
    pub async fn delete_pair_in(
        &self,
        tx: &mut dyn StoreTx,
        refresh_id: TokenId,
        effects: &mut CacheEffects,
    ) -> Result<(), LifecycleError> {
        let access = tx.delete_access_tokens_paired_to(refresh_id).await?;
        let refresh = tx
            .delete_token(refresh_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        evict_all(&access, effects);
        evict_all(std::slice::from_ref(&refresh), effects);
        Ok(())
    }

    /// Delete every token of the user.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::Repository` if persistence fails.
    pub async fn revoke_all_in(
        &self,
        tx: &mut dyn StoreTx,
        user_id: UserId,
        effects: &mut CacheEffects,
    ) -> Result<usize, LifecycleError> {
        let removed = tx.delete_tokens_for_user(user_id).await?;
        evict_all(&removed, effects);
        Ok(removed.len())
    }

    // =========================================================================
    // Standalone operations
    // =========================================================================

    /// [`create_pair_in`](Self::create_pair_in) in its own transaction.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError` if signing or persistence fails; nothing is
    /// persisted in that case.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn create_pair(&self, user: &UserSnapshot) -> Result<IssuedPair, LifecycleError> {
        let mut tx = self.store.begin().await?;
        let mut effects = CacheEffects::new();
        let pair = self.create_pair_in(tx.as_mut(), user, &mut effects).await?;
        tx.commit().await?;
        self.cache.apply(effects).await;
        Ok(pair)
    }

    /// [`delete_pair_in`](Self::delete_pair_in) in its own transaction.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError` if the refresh record is missing or
    /// persistence fails.
    #[instrument(skip(self))]
    pub async fn delete_pair(&self, refresh_id: TokenId) -> Result<(), LifecycleError> {
        let mut tx = self.store.begin().await?;
        let mut effects = CacheEffects::new();
        self.delete_pair_in(tx.as_mut(), refresh_id, &mut effects)
            .await?;
        tx.commit().await?;
        self.cache.apply(effects).await;
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn insert_access_in(
        &self,
        tx: &mut dyn StoreTx,
        user: &UserSnapshot,
        refresh_id: TokenId,
        effects: &mut CacheEffects,
    ) -> Result<IssuedAccess, LifecycleError> {
        let (access_token, claims) = self.codec.issue(user.id, &user.email, TokenKind::Access)?;
        let access_hash = codec::hash(&access_token);
        tx.insert_token(NewToken {
            user_id: user.id,
            kind: TokenKind::Access,
            token_hash: &access_hash,
            paired_token_id: Some(refresh_id),
        })
        .await?;
        effects.cache_token(user, TokenKind::Access, &access_hash, claims.exp);

        Ok(IssuedAccess {
            access_token,
            refresh_id,
        })
    }
}

fn evict_all(records: &[TokenRecord], effects: &mut CacheEffects) {
    for record in records {
        effects.revoke_token(record.user_id, record.kind, &record.token_hash);
    }
}
