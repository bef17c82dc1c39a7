//! Unified authorization error model: one enum, SQLSTATE-aligned codes,
//! and a pgwire-ready accessor pair, mirroring the house `AppError` shape.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthError {
    /// X_28000 — malformed password/role specification.
    InvalidAuthSpec { message: String },
    /// X_28501 — grantee name not found in the manager.
    GranteeNotFound { name: String },
    /// X_28502 — attempt to mutate a reserved/system principal.
    GranteeImmutable { name: String },
    /// X_28503 — attempt to create a grantee whose name already exists.
    GranteeExists { name: String },
    /// X_42507 — caller lacks the rights to perform this action at all.
    NotAuthorizedGeneral { message: String },
    /// X_42501 — caller lacks the specific object-level right requested.
    NotAuthorizedObject { object: String },
    /// X_0P000 — role name does not resolve to a role grantee.
    InvalidRole { name: String },
    /// X_0P501 — granting this role would introduce a cycle.
    InvalidRoleCycle { name: String },
    /// X_0L000 — revoke/drop would strand a dependent grant.
    DependentGrantMissing { name: String },
}

impl AuthError {
    pub fn code_str(&self) -> &str {
        match self {
            AuthError::InvalidAuthSpec { .. } => "X_28000",
            AuthError::GranteeNotFound { .. } => "X_28501",
            AuthError::GranteeImmutable { .. } => "X_28502",
            AuthError::GranteeExists { .. } => "X_28503",
            AuthError::NotAuthorizedGeneral { .. } => "X_42507",
            AuthError::NotAuthorizedObject { .. } => "X_42501",
            AuthError::InvalidRole { .. } => "X_0P000",
            AuthError::InvalidRoleCycle { .. } => "X_0P501",
            AuthError::DependentGrantMissing { .. } => "X_0L000",
        }
    }

    pub fn message(&self) -> String {
        match self {
            AuthError::InvalidAuthSpec { message } => message.clone(),
            AuthError::GranteeNotFound { name } => format!("grantee not found: {name}"),
            AuthError::GranteeImmutable { name } => format!("grantee is immutable: {name}"),
            AuthError::GranteeExists { name } => format!("grantee already exists: {name}"),
            AuthError::NotAuthorizedGeneral { message } => message.clone(),
            AuthError::NotAuthorizedObject { object } => format!("not authorized on: {object}"),
            AuthError::InvalidRole { name } => format!("not a role: {name}"),
            AuthError::InvalidRoleCycle { name } => format!("role cycle introduced by: {name}"),
            AuthError::DependentGrantMissing { name } => format!("dependent grant would be left dangling: {name}"),
        }
    }

    pub fn invalid_auth_spec<S: Into<String>>(msg: S) -> Self {
        AuthError::InvalidAuthSpec { message: msg.into() }
    }
    pub fn grantee_not_found<S: Into<String>>(name: S) -> Self {
        AuthError::GranteeNotFound { name: name.into() }
    }
    pub fn grantee_immutable<S: Into<String>>(name: S) -> Self {
        AuthError::GranteeImmutable { name: name.into() }
    }
    pub fn grantee_exists<S: Into<String>>(name: S) -> Self {
        AuthError::GranteeExists { name: name.into() }
    }
    pub fn not_authorized_general<S: Into<String>>(msg: S) -> Self {
        AuthError::NotAuthorizedGeneral { message: msg.into() }
    }
    pub fn not_authorized_object<S: Into<String>>(object: S) -> Self {
        AuthError::NotAuthorizedObject { object: object.into() }
    }
    pub fn invalid_role<S: Into<String>>(name: S) -> Self {
        AuthError::InvalidRole { name: name.into() }
    }
    pub fn invalid_role_cycle<S: Into<String>>(name: S) -> Self {
        AuthError::InvalidRoleCycle { name: name.into() }
    }
    pub fn dependent_grant_missing<S: Into<String>>(name: S) -> Self {
        AuthError::DependentGrantMissing { name: name.into() }
    }

    /// Non-fatal counterpart used when a multi-object grant/revoke partially
    /// succeeds (W_01007): not an `AuthError` variant, but recorded through
    /// `WarningSink` using the same code/message shape.
    pub fn partial_grant_warning<S: Into<String>>(object: S) -> Self {
        AuthError::NotAuthorizedObject { object: object.into() }
    }

    /// Map to pgwire-style (sqlstate, severity, message).
    pub fn pgwire_fields(&self) -> (&'static str, &'static str, String) {
        let msg = self.message();
        match self {
            AuthError::InvalidAuthSpec { .. } => ("28000", "ERROR", msg),
            AuthError::GranteeNotFound { .. } => ("28501", "ERROR", msg),
            AuthError::GranteeImmutable { .. } => ("28502", "ERROR", msg),
            AuthError::GranteeExists { .. } => ("28503", "ERROR", msg),
            AuthError::NotAuthorizedGeneral { .. } => ("42507", "ERROR", msg),
            AuthError::NotAuthorizedObject { .. } => ("42501", "ERROR", msg),
            AuthError::InvalidRole { .. } => ("0P000", "ERROR", msg),
            AuthError::InvalidRoleCycle { .. } => ("0P501", "ERROR", msg),
            AuthError::DependentGrantMissing { .. } => ("0L000", "ERROR", msg),
        }
    }
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AuthError {}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::NotAuthorizedGeneral { message: err.to_string() }
    }
}
