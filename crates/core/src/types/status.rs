//! Status enums for tokens, carts, checkouts and user roles.
//!
//! With the `postgres` feature each enum maps onto a Postgres enum type in the
//! `shop` schema.

use serde::{Deserialize, Serialize};

/// Kind of an issued credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.token_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    /// Short-lived credential for individual requests.
    Access,
    /// Long-lived credential used only to mint access tokens.
    Refresh,
}

impl TokenKind {
    /// Stable lowercase name for logs and spans. Claims use the serde form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.cart_status", rename_all = "snake_case")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartStatus {
    /// The single editable cart of a user.
    #[default]
    Active,
    InProgress,
    CheckedOut,
}

/// Outcome recorded on a checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.checkout_status", rename_all = "snake_case")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutStatus {
    Paid,
    /// The provider requires an additional authentication step (3-D Secure).
    #[serde(rename = "WAITING_3DS")]
    #[cfg_attr(feature = "postgres", sqlx(rename = "waiting_3ds"))]
    Waiting3ds,
    Failed,
}

/// User role with different permission levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular shopper.
    #[default]
    Customer,
    /// Catalogue and account administration.
    Admin,
}

impl Role {
    /// Whether a holder of this role may access something requiring `required`.
    ///
    /// `Admin` satisfies every requirement.
    #[must_use]
    pub const fn satisfies(self, required: Self) -> bool {
        matches!((self, required), (Self::Admin, _) | (Self::Customer, Self::Customer))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Customer => write!(f, "customer"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("invalid role: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_satisfies_every_role() {
        assert!(Role::Admin.satisfies(Role::Customer));
        assert!(Role::Admin.satisfies(Role::Admin));
        assert!(Role::Customer.satisfies(Role::Customer));
        assert!(!Role::Customer.satisfies(Role::Admin));
    }

    #[test]
    fn test_checkout_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&CheckoutStatus::Waiting3ds).unwrap(),
            "\"WAITING_3DS\""
        );
        assert_eq!(serde_json::to_string(&CheckoutStatus::Paid).unwrap(), "\"PAID\"");
    }

    #[test]
    fn test_token_kind_log_and_wire_names_differ() {
        assert_eq!(TokenKind::Access.to_string(), "access");
        assert_eq!(serde_json::to_string(&TokenKind::Access).unwrap(), "\"ACCESS\"");
        assert_eq!(serde_json::to_string(&TokenKind::Refresh).unwrap(), "\"REFRESH\"");
    }

    #[test]
    fn test_role_round_trips_through_display() {
        for role in [Role::Customer, Role::Admin] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
    }
}
