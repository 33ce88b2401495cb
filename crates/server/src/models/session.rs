//! Authenticated identity types.

use serde::{Deserialize, Serialize};

use marketstall_core::{Email, Role, TokenKind, UserId};

/// Cached view of a user.
///
/// Minimal data needed to authorise a request without touching the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    /// User's database ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// User's role.
    pub role: Role,
}

/// The authenticated caller of a request.
///
/// Produced by the auth verifier and threaded through handlers explicitly;
/// see `middleware::auth`.
#[derive(Debug, Clone)]
pub struct Principal {
    /// Who the caller is.
    pub user: UserSnapshot,
    /// Which kind of token authenticated the request.
    pub kind: TokenKind,
    /// SHA-256 digest of the presented token.
    pub token_hash: String,
}

impl Principal {
    /// Shorthand for the caller's user ID.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user.id
    }
}
