//! User domain types.

use chrono::{DateTime, Utc};

use cartwheel_core::{Email, UserId, Username};

/// A storefront account.
///
/// The password hash is deliberately absent; it only travels between the
/// repository and the authenticator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Unique public name.
    pub username: Username,
    /// Unique login email.
    pub email: Email,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}
