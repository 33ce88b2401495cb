//! User queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use marketstall_core::{Email, Role, UserId};

use super::{PgTx, conflict_or_database};
use crate::db::{RepoResult, RepositoryError, UserRepo};
use crate::models::User;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: UserId,
    email: String,
    role: Role,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct UserWithPasswordRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: Option<String>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            email,
            role: row.role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl UserRepo for PgTx {
    async fn create_user(
        &mut self,
        email: &Email,
        password_hash: &str,
        role: Role,
    ) -> RepoResult<User> {
        let row: UserRow = sqlx::query_as(
            r"
            INSERT INTO shop.user (email, role)
            VALUES ($1, $2)
            RETURNING id, email, role, created_at, updated_at
            ",
        )
        .bind(email.as_str())
        .bind(role)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| conflict_or_database(e, "email already exists"))?;

        sqlx::query(
            r"
            INSERT INTO shop.user_password (user_id, password_hash)
            VALUES ($1, $2)
            ",
        )
        .bind(row.id)
        .bind(password_hash)
        .execute(&mut *self.tx)
        .await?;

        User::try_from(row)
    }

    async fn user_by_id(&mut self, id: UserId) -> RepoResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            r"
            SELECT id, email, role, created_at, updated_at
            FROM shop.user
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn password_hash_by_email(
        &mut self,
        email: &Email,
    ) -> RepoResult<Option<(User, String)>> {
        let row: Option<UserWithPasswordRow> = sqlx::query_as(
            r"
            SELECT u.id, u.email, u.role, u.created_at, u.updated_at, p.password_hash
            FROM shop.user u
            LEFT JOIN shop.user_password p ON u.id = p.user_id
            WHERE u.email = $1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let Some(password_hash) = row.password_hash else {
            return Ok(None);
        };

        Ok(Some((User::try_from(row.user)?, password_hash)))
    }

    async fn password_hash_by_id(&mut self, id: UserId) -> RepoResult<Option<String>> {
        let hash: Option<String> = sqlx::query_scalar(
            r"
            SELECT password_hash FROM shop.user_password WHERE user_id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(hash)
    }

    async fn update_password(&mut self, id: UserId, password_hash: &str) -> RepoResult<()> {
        let result = sqlx::query(
            r"
            UPDATE shop.user_password
            SET password_hash = $1, updated_at = now()
            WHERE user_id = $2
            ",
        )
        .bind(password_hash)
        .bind(id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        sqlx::query("UPDATE shop.user SET updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }
}
