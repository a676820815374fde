//! linkauth broker
//!
//! Binds external identity-provider logins and a local password to one
//! internal account, and issues a refreshable session plus a short-lived
//! AuthToken for every authenticated context.

pub mod auth;
pub mod captcha;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod deadline;
pub mod email;
pub mod error;
pub mod provider;
pub mod routes;
pub mod state;
pub mod store;
pub mod useragent;

pub use auth::{Caller, ConnectionOutcome, SessionTokens};
pub use captcha::{DisabledVerifier, HumanVerifier, RecaptchaVerifier};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_or_generate_keypair, Config};
pub use email::{ConsoleEmailSender, EmailSender, OutboundEmail, SmtpConfig, SmtpEmailSender};
pub use error::{BrokerError, ErrorKind};
pub use provider::{IdentityProviderAdapter, Provider, ProviderProfile, ProviderRegistry};
pub use state::AppState;
pub use store::{InMemorySessionStore, InMemoryUserStore, SessionStore, SqliteStore, UserStore};
