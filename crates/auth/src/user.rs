//! User model for identity management.
//!
//! Passwords never live on [`User`]; the store keeps the hash next to it and
//! only hands it out for login verification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult, UserId};

use crate::{Identity, Role};

const MIN_NAME_LEN: usize = 3;
const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 6;
/// Column widths in the users table.
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_EMAIL_LEN: usize = 255;
pub const MAX_USERNAME_LEN: usize = 100;

/// Externally visible user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Field checks for a record about to be stored.
    pub fn validate(&self) -> DomainResult<()> {
        validate_name(&self.name)?;
        validate_email(&self.email)?;
        validate_username(&self.username)
    }
}

/// Input for creating a user. Plaintext password; hashed before storage.
#[derive(Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

impl core::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NewUser")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("username", &self.username)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl NewUser {
    /// Self-service registration: role is always `user`.
    pub fn registration(name: String, email: String, username: String, password: String) -> Self {
        Self {
            name,
            email,
            username,
            password,
            role: Role::User,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        validate_name(&self.name)?;
        validate_email(&self.email)?;
        validate_username(&self.username)?;
        validate_password(&self.password)?;
        Ok(())
    }
}

/// Allow-listed user update. `None` leaves the field untouched.
///
/// `id` and timestamps are not representable here; `role` is honoured only
/// for admins (see [`authorize_user_patch`]).
#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

impl core::fmt::Debug for UserPatch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserPatch")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("role", &self.role)
            .finish()
    }
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.role.is_none()
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.is_empty() {
            return Err(DomainError::validation("no fields to update"));
        }
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        if let Some(username) = &self.username {
            validate_username(username)?;
        }
        if let Some(password) = &self.password {
            validate_password(password)?;
        }
        Ok(())
    }

    /// Apply the non-secret fields to a user record. `name` and `email` are
    /// trimmed, as on creation.
    ///
    /// The password is handled by the caller (hash first).
    pub fn apply_to(&self, user: &mut User, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            user.name = name.trim().to_string();
        }
        if let Some(email) = &self.email {
            user.email = email.trim().to_string();
        }
        if let Some(username) = &self.username {
            user.username = username.clone();
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        user.updated_at = now;
    }
}

/// Self or admin may read a user record.
pub fn can_view_user(actor: &Identity, target: UserId) -> DomainResult<()> {
    if actor.is_admin() || actor.subject_id == target {
        Ok(())
    } else {
        Err(DomainError::forbidden("cannot view another user"))
    }
}

/// Permission rules for updates.
///
/// - non-admins may only edit themselves
/// - non-admins may not supply `role`, not even their current one
pub fn authorize_user_patch(actor: &Identity, target: UserId, patch: &UserPatch) -> DomainResult<()> {
    if actor.is_admin() {
        return Ok(());
    }
    if actor.subject_id != target {
        return Err(DomainError::forbidden("cannot update another user"));
    }
    if patch.role.is_some() {
        return Err(DomainError::forbidden("only admins can change roles"));
    }
    Ok(())
}

fn validate_name(name: &str) -> DomainResult<()> {
    let len = name.trim().chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return Err(DomainError::validation(format!(
            "name must be between {MIN_NAME_LEN} and {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_username(username: &str) -> DomainResult<()> {
    let len = username.trim().chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(DomainError::validation(format!(
            "username must be between {MIN_USERNAME_LEN} and {MAX_USERNAME_LEN} characters"
        )));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(DomainError::validation("username must not contain whitespace"));
    }
    Ok(())
}

fn validate_password(password: &str) -> DomainResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> DomainResult<()> {
    let invalid = || DomainError::validation("email must be a valid address");

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    if email.chars().count() > MAX_EMAIL_LEN {
        return Err(DomainError::validation(format!(
            "email must be at most {MAX_EMAIL_LEN} characters"
        )));
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let (host, tld) = domain.rsplit_once('.').ok_or_else(invalid)?;
    if host.is_empty() || tld.is_empty() {
        return Err(invalid());
    }
    Ok(())
}
