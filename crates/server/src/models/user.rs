//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use marketstall_core::{Email, Role, UserId};

use super::session::UserSnapshot;

/// A registered user (domain type).
///
/// The password hash is deliberately not part of this type; it is only read
/// through `UserRepo::password_hash_by_email`.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Normalised email address.
    pub email: Email,
    /// Permission level.
    pub role: Role,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// The subset of the user kept in the session cache.
    #[must_use]
    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            id: self.id,
            email: self.email.clone(),
            role: self.role,
        }
    }
}
