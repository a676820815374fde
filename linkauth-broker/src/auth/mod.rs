//! Identity binding and session issuance
//!
//! Each submodule adds operations to [`AppState`](crate::state::AppState):
//!
//! - `caller`: the per-request caller context resolved from the AuthToken
//! - `connection`: the provider-agnostic start/complete flow
//! - `linking`: login-method census and the last-login-method guard
//! - `sessions`: login, refresh, logout and single-use login tokens
//! - `password`: password registration, login, change and reset
//! - `account`: email verification, role changes and deactivation
//! - `sweeper`: batched deletion of expired sessions and tokens

pub mod account;
pub mod caller;
pub mod connection;
pub mod linking;
pub mod password;
pub mod sessions;
pub mod sweeper;

pub use account::EmailChange;
pub use caller::Caller;
pub use connection::{ConnectionOutcome, PendingProfile, RegistrationConfirmation, StartedConnection};
pub use linking::LoginMethods;
pub use password::PasswordRegistration;
pub use sessions::{SessionOverview, SessionTokens};
pub use sweeper::{delete_in_batches, SweepReport};

use chrono::Duration;

/// How long a started provider flow may take to come back
pub fn connection_ttl() -> Duration {
    Duration::minutes(30)
}

/// How long a provider profile waits for registration confirmation
pub fn registration_ttl() -> Duration {
    Duration::hours(1)
}

/// SessionToken lifetime and session idle limit
pub fn session_ttl() -> Duration {
    Duration::days(7)
}

pub fn auth_token_ttl() -> Duration {
    Duration::minutes(10)
}

pub fn reset_ttl() -> Duration {
    Duration::minutes(120)
}

pub fn verification_ttl() -> Duration {
    Duration::days(7)
}

/// Records per delete call when sweeping
pub const SWEEP_BATCH_SIZE: usize = 500;
