//! Token record queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use marketstall_core::{TokenId, TokenKind, UserId};

use super::{PgTx, conflict_or_database};
use crate::db::{RepoResult, TokenRepo};
use crate::models::{NewToken, TokenRecord};

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: TokenId,
    user_id: UserId,
    kind: TokenKind,
    token_hash: String,
    paired_token_id: Option<TokenId>,
    created_at: DateTime<Utc>,
}

impl From<TokenRow> for TokenRecord {
    fn from(row: TokenRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            kind: row.kind,
            token_hash: row.token_hash,
            paired_token_id: row.paired_token_id,
            created_at: row.created_at,
        }
    }
}

fn into_records(rows: Vec<TokenRow>) -> Vec<TokenRecord> {
    rows.into_iter().map(TokenRecord::from).collect()
}

#[async_trait]
impl TokenRepo for PgTx {
    async fn insert_token(&mut self, token: NewToken<'_>) -> RepoResult<TokenRecord> {
        let row: TokenRow = sqlx::query_as(
            r"
            INSERT INTO shop.token (user_id, kind, token_hash, paired_token_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, kind, token_hash, paired_token_id, created_at
            ",
        )
        .bind(token.user_id)
        .bind(token.kind)
        .bind(token.token_hash)
        .bind(token.paired_token_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| conflict_or_database(e, "token already stored or already paired"))?;

        Ok(row.into())
    }

    async fn find_token(
        &mut self,
        user_id: UserId,
        kind: TokenKind,
        token_hash: &str,
    ) -> RepoResult<Option<TokenRecord>> {
        let row: Option<TokenRow> = sqlx::query_as(
            r"
            SELECT id, user_id, kind, token_hash, paired_token_id, created_at
            FROM shop.token
            WHERE user_id = $1 AND kind = $2 AND token_hash = $3
            ",
        )
        .bind(user_id)
        .bind(kind)
        .bind(token_hash)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(TokenRecord::from))
    }

    async fn tokens_for_user(&mut self, user_id: UserId) -> RepoResult<Vec<TokenRecord>> {
        let rows: Vec<TokenRow> = sqlx::query_as(
            r"
            SELECT id, user_id, kind, token_hash, paired_token_id, created_at
            FROM shop.token
            WHERE user_id = $1
            ORDER BY id
            ",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(into_records(rows))
    }

    async fn delete_access_tokens_paired_to(
        &mut self,
        refresh_id: TokenId,
    ) -> RepoResult<Vec<TokenRecord>> {
        let rows: Vec<TokenRow> = sqlx::query_as(
            r"
            DELETE FROM shop.token
            WHERE paired_token_id = $1 AND kind = 'access'
            RETURNING id, user_id, kind, token_hash, paired_token_id, created_at
            ",
        )
        .bind(refresh_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(into_records(rows))
    }

    async fn delete_token(&mut self, id: TokenId) -> RepoResult<Option<TokenRecord>> {
        let row: Option<TokenRow> = sqlx::query_as(
            r"
            DELETE FROM shop.token
            WHERE id = $1
            RETURNING id, user_id, kind, token_hash, paired_token_id, created_at
            ",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(TokenRecord::from))
    }

    async fn delete_tokens_for_user(&mut self, user_id: UserId) -> RepoResult<Vec<TokenRecord>> {
        // Access rows first: the cascade from a refresh row would hide its
        // access row from RETURNING.
        let mut rows: Vec<TokenRow> = sqlx::query_as(
            r"
            DELETE FROM shop.token
            WHERE user_id = $1 AND kind = 'access'
            RETURNING id, user_id, kind, token_hash, paired_token_id, created_at
            ",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        let refresh: Vec<TokenRow> = sqlx::query_as(
            r"
            DELETE FROM shop.token
            WHERE user_id = $1
            RETURNING id, user_id, kind, token_hash, paired_token_id, created_at
            ",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.extend(refresh);
        Ok(into_records(rows))
    }
}
