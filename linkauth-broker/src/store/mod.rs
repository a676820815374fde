//! Storage abstractions for the broker
//!
//! The store is a single logical document store with atomic per-record
//! operations and no multi-record transactions. Every ephemeral record
//! (connection, registration, reset, verification, login token) is consumed
//! through a `take_*` call that removes and returns it in one step, so a
//! replayed callback can never redeem the same record twice.

pub mod memory;
pub mod models;
pub mod sqlite;

pub use memory::{InMemorySessionStore, InMemoryUserStore};
pub use models::*;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BrokerError;
use crate::provider::Provider;

/// Result type for store operations
pub type StoreResult<T> = Result<T, BrokerError>;

/// Accounts, login methods, and the ephemeral records of the login flows
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. Fails with `EmailInUse` if the email is taken.
    async fn create_user(&self, user: User) -> StoreResult<()>;

    async fn get_user(&self, user_id: &UserId) -> StoreResult<Option<User>>;

    /// Case-insensitive lookup on the user's primary email
    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Replace a stored user
    async fn update_user(&self, user: &User) -> StoreResult<()>;

    /// Insert a password login. Fails with `EmailInUse` on a duplicate email.
    async fn create_credential(&self, credential: Credential) -> StoreResult<()>;

    async fn get_credential_by_email(&self, email: &str) -> StoreResult<Option<Credential>>;

    async fn get_credential_by_user(&self, user_id: &UserId) -> StoreResult<Option<Credential>>;

    /// Replace the credential owned by `credential.user_id` (email and hash)
    async fn update_credential(&self, credential: &Credential) -> StoreResult<()>;

    /// Remove the user's password login; returns whether one existed
    async fn delete_credential(&self, user_id: &UserId) -> StoreResult<bool>;

    /// Bind an external identity. Fails with `AlreadyLinked` if either the
    /// external identity or the user already has a link for this provider.
    async fn create_link(&self, link: ExternalLink) -> StoreResult<()>;

    async fn get_link(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> StoreResult<Option<ExternalLink>>;

    async fn get_link_for_user(
        &self,
        provider: Provider,
        user_id: &UserId,
    ) -> StoreResult<Option<ExternalLink>>;

    /// Remove the user's link for a provider; returns whether one existed
    async fn delete_link(&self, provider: Provider, user_id: &UserId) -> StoreResult<bool>;

    async fn create_connection(&self, connection: PendingConnection) -> StoreResult<()>;

    /// Atomically remove and return a pending connection
    async fn take_connection(&self, state: &str) -> StoreResult<Option<PendingConnection>>;

    async fn create_registration(&self, registration: PendingRegistration) -> StoreResult<()>;

    /// Atomically remove and return a pending registration
    async fn take_registration(&self, key: &str) -> StoreResult<Option<PendingRegistration>>;

    /// Insert or replace the user's reset record
    async fn put_password_reset(&self, reset: PasswordReset) -> StoreResult<()>;

    async fn get_password_reset(&self, user_id: &UserId) -> StoreResult<Option<PasswordReset>>;

    /// Atomically remove and return the user's reset record
    async fn take_password_reset(&self, user_id: &UserId) -> StoreResult<Option<PasswordReset>>;

    /// Store a verification record, replacing any live record for the same user
    async fn put_email_verification(&self, verification: EmailVerification) -> StoreResult<()>;

    /// Atomically remove and return a verification record
    async fn take_email_verification(&self, id: &str) -> StoreResult<Option<EmailVerification>>;

    /// Delete connections created before `connections_before`, registrations
    /// created before `registrations_before`, and resets and verifications
    /// that expired before `now`
    async fn purge_ephemeral(
        &self,
        connections_before: DateTime<Utc>,
        registrations_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<u64>;
}

/// Sessions and single-use bearer tokens
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: Session) -> StoreResult<()>;

    async fn get_session(&self, session_id: &SessionId) -> StoreResult<Option<Session>>;

    /// Replace a stored session. Fails with `NotFound` if it no longer exists.
    async fn update_session(&self, session: &Session) -> StoreResult<()>;

    async fn delete_session(&self, session_id: &SessionId) -> StoreResult<bool>;

    /// All sessions of a user, most recently used first
    async fn list_sessions(&self, user_id: &UserId) -> StoreResult<Vec<Session>>;

    /// IDs of sessions last used before `cutoff`
    async fn sessions_used_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<SessionId>>;

    async fn delete_sessions(&self, ids: &[SessionId]) -> StoreResult<u64>;

    async fn create_login_token(&self, token: BearerToken) -> StoreResult<()>;

    /// Atomically remove and return a login token
    async fn take_login_token(&self, token: &str) -> StoreResult<Option<BearerToken>>;

    async fn login_tokens_expired_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>>;

    async fn delete_login_tokens(&self, tokens: &[String]) -> StoreResult<u64>;

    async fn create_merge_token(&self, token: BearerToken) -> StoreResult<()>;

    async fn get_merge_token(&self, token: &str) -> StoreResult<Option<BearerToken>>;

    async fn merge_tokens_expired_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>>;

    async fn delete_merge_tokens(&self, tokens: &[String]) -> StoreResult<u64>;
}
