//! Data models for broker storage

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use linkauth_core::RoleFlags;

use crate::provider::Provider;

/// Unique user identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a pending provider connection was started for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Register,
    Login,
    Attach,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Register => "register",
            Purpose::Login => "login",
            Purpose::Attach => "attach",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "register" => Some(Purpose::Register),
            "login" => Some(Purpose::Login),
            "attach" => Some(Purpose::Attach),
            _ => None,
        }
    }
}

/// An internal account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub verified_email: bool,
    /// Email awaiting verification for an already-verified account
    pub changing_email: Option<String>,
    pub roles: RoleFlags,
    pub newsletter: bool,
    pub created_at: DateTime<Utc>,
}

/// Password login for one user
#[derive(Debug, Clone)]
pub struct Credential {
    /// Always lowercased
    pub email: String,
    pub password_hash: String,
    pub user_id: UserId,
}

/// One provider identity bound to one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalLink {
    pub provider: Provider,
    pub external_id: String,
    pub user_id: UserId,
}

/// In-flight OAuth handshake, keyed by its state token
#[derive(Debug, Clone)]
pub struct PendingConnection {
    pub state: String,
    pub provider: Provider,
    pub purpose: Purpose,
    pub merge_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Provider profile awaiting the user's confirmation
#[derive(Debug, Clone)]
pub struct PendingRegistration {
    pub key: String,
    pub provider: Provider,
    pub external_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

/// Request-derived metadata about the device behind a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientMetadata {
    pub ip: String,
    pub os: String,
    pub browser: String,
    pub is_mobile: bool,
}

/// One authenticated device or browser
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub last_used: DateTime<Utc>,
    pub client: ClientMetadata,
    /// Role flags as they were when the session was issued
    pub roles: RoleFlags,
}

/// Single-use bearer value (login token or merge token)
#[derive(Debug, Clone)]
pub struct BearerToken {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

/// Password reset in progress
#[derive(Debug, Clone)]
pub struct PasswordReset {
    pub id: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

/// Pending proof of ownership for an email address
#[derive(Debug, Clone)]
pub struct EmailVerification {
    pub id: String,
    pub user_id: UserId,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}
