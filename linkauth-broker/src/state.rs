//! Shared application state

use std::future::Future;
use std::sync::Arc;

use linkauth_core::TokenSigner;

use crate::captcha::{DisabledVerifier, HumanVerifier};
use crate::clock::{Clock, SystemClock};
use crate::deadline::{with_deadline, Timeouts};
use crate::email::{EmailSender, OutboundEmail};
use crate::error::BrokerError;
use crate::provider::ProviderRegistry;
use crate::store::StoreResult;

/// Everything a request needs: signer, stores, collaborators and limits
pub struct AppState<U, S, E> {
    pub signer: TokenSigner,
    pub user_store: Arc<U>,
    pub session_store: Arc<S>,
    pub email_sender: E,
    pub providers: ProviderRegistry,
    pub human_verifier: Arc<dyn HumanVerifier>,
    pub clock: Arc<dyn Clock>,
    pub timeouts: Timeouts,
    /// Base URL for links in outgoing email
    pub site_url: String,
    /// Honour `X-Forwarded-For`; only set when a trusted proxy fronts the broker
    pub trust_proxy: bool,
}

impl<U, S, E> AppState<U, S, E> {
    pub fn new(signer: TokenSigner, user_store: U, session_store: S, email_sender: E) -> Self {
        Self::with_shared_stores(signer, Arc::new(user_store), Arc::new(session_store), email_sender)
    }

    /// Build over stores that may be the same object (e.g. one `SqliteStore`)
    pub fn with_shared_stores(
        signer: TokenSigner,
        user_store: Arc<U>,
        session_store: Arc<S>,
        email_sender: E,
    ) -> Self {
        Self {
            signer,
            user_store,
            session_store,
            email_sender,
            providers: ProviderRegistry::new(),
            human_verifier: Arc::new(DisabledVerifier),
            clock: Arc::new(SystemClock),
            timeouts: Timeouts::default(),
            site_url: "http://localhost:3000".to_string(),
            trust_proxy: false,
        }
    }

    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_human_verifier(mut self, verifier: Arc<dyn HumanVerifier>) -> Self {
        self.human_verifier = verifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_site_url(mut self, site_url: impl Into<String>) -> Self {
        self.site_url = site_url.into();
        self
    }

    pub fn with_trusted_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    /// Run one record-store call under the store deadline
    pub(crate) async fn store<T, F>(&self, what: &'static str, call: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        with_deadline(self.timeouts.store, what, call).await
    }
}

impl<U, S, E: EmailSender> AppState<U, S, E> {
    /// Deliver a notification; failures surface as `Upstream`
    pub(crate) fn notify(&self, email: &OutboundEmail) -> Result<(), BrokerError> {
        self.email_sender.send(email).map_err(|e| {
            tracing::error!(email = %email.recipient_email, error = %e, "Notification delivery failed");
            BrokerError::Upstream(e)
        })
    }
}
