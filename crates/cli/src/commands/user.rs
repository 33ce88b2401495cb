//! User management.
//!
//! Creates accounts directly in the store, e.g. the first administrator
//! (sign-up over HTTP only ever creates customers).

use marketstall_core::{Email, Role};
use marketstall_server::db::{RepositoryError, Store};
use marketstall_server::services::auth::{hash_password, validate_password};

use super::{CliError, store};

const DEFAULT_PASSWORD_MIN_LENGTH: usize = 8;

fn password_min_length() -> Result<usize, CliError> {
    std::env::var("MARKETSTALL_PASSWORD_MIN_LENGTH").map_or(
        Ok(DEFAULT_PASSWORD_MIN_LENGTH),
        |v| {
            v.parse()
                .map_err(|_| CliError::InvalidArgument("MARKETSTALL_PASSWORD_MIN_LENGTH", v))
        },
    )
}

/// Create a user and return its id.
pub async fn create(email: &str, password: &str, role: &str) -> Result<i32, CliError> {
    let role: Role = role
        .parse()
        .map_err(|e: String| CliError::InvalidArgument("role", e))?;
    let email =
        Email::parse(email).map_err(|e| CliError::InvalidArgument("email", e.to_string()))?;
    let store = store().await?;
    validate_password(password, password_min_length()?)?;
    let password_hash = hash_password(password)?;

    tracing::info!("Creating user: {} ({})", email, role);

    let mut tx = store.begin().await?;
    let user = match tx.create_user(&email, &password_hash, role).await {
        Ok(user) => user,
        Err(RepositoryError::Conflict(_)) => {
            return Err(CliError::InvalidArgument(
                "email",
                format!("a user with email {email} already exists"),
            ));
        }
        Err(e) => return Err(e.into()),
    };
    tx.commit().await?;

    tracing::info!("User created with ID: {}", user.id);
    Ok(user.id.as_i32())
}
