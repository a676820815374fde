//! Provider-agnostic connection flow
//!
//! ```text
//! start_connection ──► PendingConnection ──► provider ──► complete_connection
//!                                                           │ take (single use)
//!                                                           │ TTL check
//!                                                           │ exchange code
//!                                                           ├─ Register ─► PendingRegistration ─► register_with_provider
//!                                                           ├─ Login    ─► session
//!                                                           └─ Attach   ─► ExternalLink
//! ```
//!
//! The connection record is consumed before anything else is checked, so a
//! replayed callback always fails with `ConnectionNotFound`.

use serde::{Deserialize, Serialize};

use super::{connection_ttl, registration_ttl, Caller, SessionTokens};
use crate::crypto::{generate_token, is_disposable_email, is_valid_email};
use crate::deadline::with_deadline;
use crate::email::EmailSender;
use crate::error::BrokerError;
use crate::provider::{Provider, ProviderProfile};
use crate::state::AppState;
use crate::store::{
    ClientMetadata, ExternalLink, PendingConnection, PendingRegistration, Purpose,
    RoleFlags, SessionStore, User, UserId, UserStore,
};

/// A started provider flow
#[derive(Debug, Clone, Serialize)]
pub struct StartedConnection {
    pub state: String,
    /// Where to send the user agent
    pub authorization_url: String,
}

/// Provider profile waiting for the user to confirm registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingProfile {
    pub key: String,
    pub provider: Provider,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// How a completed connection resolved
#[derive(Debug, Clone)]
pub enum ConnectionOutcome {
    RegisterPending(PendingProfile),
    LoggedIn(SessionTokens),
    Attached(Provider),
}

/// The user's answer to a [`PendingProfile`]
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationConfirmation {
    pub key: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Human-verification response token
    pub human_verification: String,
    #[serde(default)]
    pub newsletter: bool,
}

impl<U: UserStore, S: SessionStore, E: EmailSender> AppState<U, S, E> {
    /// Record a pending connection and return the provider's authorization URL
    pub async fn start_connection(
        &self,
        provider: Provider,
        purpose: Purpose,
        merge_token: Option<String>,
    ) -> Result<StartedConnection, BrokerError> {
        let adapter = self.providers.get(provider)?;

        let connection = PendingConnection {
            state: generate_token(),
            provider,
            purpose,
            merge_token: merge_token.filter(|t| !t.is_empty()),
            created_at: self.clock.now(),
        };
        let state = connection.state.clone();
        self.store("connection create", self.user_store.create_connection(connection))
            .await?;

        tracing::debug!(provider = %provider, purpose = purpose.as_str(), "Connection started");
        Ok(StartedConnection {
            authorization_url: adapter.authorization_url(&state),
            state,
        })
    }

    /// Resolve a provider callback
    pub async fn complete_connection(
        &self,
        provider: Provider,
        state: &str,
        code: &str,
        caller: Option<&Caller>,
        client: ClientMetadata,
    ) -> Result<ConnectionOutcome, BrokerError> {
        let connection = self
            .store("connection take", self.user_store.take_connection(state))
            .await?
            .filter(|c| c.provider == provider)
            .ok_or(BrokerError::ConnectionNotFound)?;

        let now = self.clock.now();
        if now > connection.created_at + connection_ttl() {
            return Err(BrokerError::ConnectionExpired);
        }

        let adapter = self.providers.get(provider)?;
        let profile = with_deadline(self.timeouts.provider, "identity provider", async {
            adapter
                .exchange_code(code)
                .await
                .map_err(|e| BrokerError::ProviderExchangeFailed {
                    provider,
                    reason: e.to_string(),
                })
        })
        .await?;

        if profile.external_id.is_empty() || profile.email.is_empty() {
            return Err(BrokerError::ProviderProfileIncomplete(provider));
        }

        match connection.purpose {
            Purpose::Register => self
                .stage_registration(provider, profile)
                .await
                .map(ConnectionOutcome::RegisterPending),
            Purpose::Login => self
                .login_linked(provider, &profile, connection.merge_token.as_deref(), client)
                .await
                .map(ConnectionOutcome::LoggedIn),
            Purpose::Attach => {
                let caller = caller.ok_or(BrokerError::Unauthenticated)?;
                self.attach(provider, &profile, caller).await?;
                Ok(ConnectionOutcome::Attached(provider))
            }
        }
    }

    async fn stage_registration(
        &self,
        provider: Provider,
        profile: ProviderProfile,
    ) -> Result<PendingProfile, BrokerError> {
        self.ensure_unlinked(provider, &profile.external_id).await?;
        if self
            .store("user lookup", self.user_store.get_user_by_email(&profile.email))
            .await?
            .is_some()
        {
            return Err(BrokerError::EmailInUse);
        }

        let registration = PendingRegistration {
            key: generate_token(),
            provider,
            external_id: profile.external_id,
            email: profile.email,
            first_name: profile.first_name,
            last_name: profile.last_name,
            created_at: self.clock.now(),
        };
        let pending = PendingProfile {
            key: registration.key.clone(),
            provider,
            email: registration.email.clone(),
            first_name: registration.first_name.clone(),
            last_name: registration.last_name.clone(),
        };
        self.store("registration create", self.user_store.create_registration(registration))
            .await?;

        Ok(pending)
    }

    async fn login_linked(
        &self,
        provider: Provider,
        profile: &ProviderProfile,
        merge_token: Option<&str>,
        client: ClientMetadata,
    ) -> Result<SessionTokens, BrokerError> {
        let link = self
            .store("link lookup", self.user_store.get_link(provider, &profile.external_id))
            .await?
            .ok_or(BrokerError::NoAccountLinked)?;
        let user = self
            .store("user lookup", self.user_store.get_user(&link.user_id))
            .await?
            .ok_or(BrokerError::NotFound("user"))?;

        // Merge tokens are carried through but not applied to anything yet.
        if merge_token.is_some() {
            tracing::info!(user_id = %user.id, provider = %provider, "Merge token present on login; ignored");
        }

        self.login(&user, client).await
    }

    async fn attach(&self, provider: Provider, profile: &ProviderProfile, caller: &Caller) -> Result<(), BrokerError> {
        self.ensure_unlinked(provider, &profile.external_id).await?;

        let link = ExternalLink {
            provider,
            external_id: profile.external_id.clone(),
            user_id: caller.user_id.clone(),
        };
        self.store("link create", self.user_store.create_link(link)).await?;

        tracing::info!(user_id = %caller.user_id, provider = %provider, "Provider attached");
        Ok(())
    }

    async fn ensure_unlinked(&self, provider: Provider, external_id: &str) -> Result<(), BrokerError> {
        match self
            .store("link lookup", self.user_store.get_link(provider, external_id))
            .await?
        {
            Some(_) => Err(BrokerError::AlreadyLinked),
            None => Ok(()),
        }
    }

    /// Turn a confirmed [`PendingProfile`] into an account, link and session
    pub async fn register_with_provider(
        &self,
        provider: Provider,
        confirmation: RegistrationConfirmation,
        client: ClientMetadata,
    ) -> Result<SessionTokens, BrokerError> {
        let email = confirmation.email.trim().to_string();
        if !is_valid_email(&email) {
            return Err(BrokerError::Validation("invalid email address".into()));
        }
        if is_disposable_email(&email) {
            return Err(BrokerError::Validation("disposable email addresses are not accepted".into()));
        }

        self.human_verifier
            .verify(&confirmation.human_verification, &client.ip)
            .await?;

        let registration = self
            .store("registration take", self.user_store.take_registration(&confirmation.key))
            .await?
            .filter(|r| r.provider == provider)
            .ok_or(BrokerError::RegistrationNotFound)?;

        let now = self.clock.now();
        if now > registration.created_at + registration_ttl() {
            return Err(BrokerError::RegistrationExpired);
        }

        self.ensure_unlinked(provider, &registration.external_id).await?;
        if self
            .store("user lookup", self.user_store.get_user_by_email(&email))
            .await?
            .is_some()
        {
            return Err(BrokerError::EmailInUse);
        }

        let user = User {
            id: UserId::generate(),
            email: email.clone(),
            first_name: confirmation.first_name,
            last_name: confirmation.last_name,
            verified_email: false,
            changing_email: None,
            roles: RoleFlags::default(),
            newsletter: confirmation.newsletter,
            created_at: now,
        };
        self.store("user create", self.user_store.create_user(user.clone()))
            .await?;
        let link = ExternalLink {
            provider,
            external_id: registration.external_id,
            user_id: user.id.clone(),
        };
        self.store("link create", self.user_store.create_link(link)).await?;

        // The account must be usable before anything is sent out
        self.send_verification(&user, &email).await?;

        tracing::info!(user_id = %user.id, provider = %provider, "User registered via provider");
        self.login(&user, client).await
    }

    /// Remove the caller's link for `provider`, keeping at least one login method
    pub async fn detach_provider(&self, caller: &Caller, provider: Provider) -> Result<(), BrokerError> {
        self.ensure_not_last_login(&caller.user_id).await?;

        let removed = self
            .store("link delete", self.user_store.delete_link(provider, &caller.user_id))
            .await?;
        if !removed {
            return Err(BrokerError::NotFound("provider link"));
        }

        tracing::info!(user_id = %caller.user_id, provider = %provider, "Provider detached");
        Ok(())
    }
}
