//! Persisted token records.

use chrono::{DateTime, Utc};

use marketstall_core::{TokenId, TokenKind, UserId};

/// A stored credential (domain type).
///
/// Only the digest of the token is persisted, never the token itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub id: TokenId,
    pub user_id: UserId,
    pub kind: TokenKind,
    pub token_hash: String,
    /// For ACCESS records, the REFRESH record this token was minted with.
    pub paired_token_id: Option<TokenId>,
    pub created_at: DateTime<Utc>,
}

/// Input for inserting a token record.
#[derive(Debug, Clone, Copy)]
pub struct NewToken<'a> {
    pub user_id: UserId,
    pub kind: TokenKind,
    pub token_hash: &'a str,
    pub paired_token_id: Option<TokenId>,
}
