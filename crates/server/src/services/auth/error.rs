//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::tokens::{LifecycleError, TokenError};

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] marketstall_core::EmailError),

    /// Unknown email or wrong password at sign-in.
    #[error("incorrect email or password")]
    InvalidCredentials,

    /// Wrong current password on password change.
    #[error("incorrect password")]
    IncorrectPassword,

    /// New password equals the current one.
    #[error("password was used before")]
    PasswordReused,

    /// User not found.
    #[error("user not found")]
    UserNotFound,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Signature, structure or kind check failed.
    #[error("invalid token")]
    InvalidToken,

    /// Valid signature, past expiry.
    #[error("token expired")]
    TokenExpired,

    /// Valid signature but the record was revoked or rotated away.
    #[error("token not found")]
    TokenNotFound,

    /// Token could not be issued.
    #[error("token signing failed: {0}")]
    Signing(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired { .. } => Self::TokenExpired,
            TokenError::Malformed | TokenError::InvalidSignature | TokenError::WrongKind { .. } => {
                Self::InvalidToken
            }
            TokenError::Signing(msg) => Self::Signing(msg),
        }
    }
}

impl From<LifecycleError> for AuthError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::Token(e) => e.into(),
            LifecycleError::Repository(RepositoryError::NotFound) => Self::TokenNotFound,
            LifecycleError::Repository(e) => Self::Repository(e),
        }
    }
}
