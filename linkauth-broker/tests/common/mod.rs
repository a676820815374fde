//! Common test utilities for broker integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use axum_test::TestServer;
use chrono::{DateTime, TimeZone, Utc};
use linkauth_broker::auth::{Caller, RegistrationConfirmation, SessionTokens};
use linkauth_broker::provider::{ExchangeError, IdentityProviderAdapter};
use linkauth_broker::store::{
    BearerToken, ClientMetadata, Purpose, Session, SessionId, SessionStore, StoreResult, UserId,
    UserStore,
};
use linkauth_broker::{
    routes, AppState, BrokerError, Clock, ConnectionOutcome, EmailSender, HumanVerifier,
    InMemorySessionStore, InMemoryUserStore, ManualClock, OutboundEmail, Provider,
    ProviderProfile, ProviderRegistry,
};
use linkauth_core::{KeyPair, TokenSigner};

/// The response token `MockHumanVerifier` accepts
pub const HUMAN: &str = "human";

/// Mock email sender that captures every notification
#[derive(Default, Clone)]
pub struct MockEmailSender {
    pub sent: Arc<RwLock<Vec<OutboundEmail>>>,
    pub fail: Arc<RwLock<bool>>,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last notification sent to an email
    pub fn last_to(&self, email: &str) -> Option<OutboundEmail> {
        self.sent
            .read()
            .unwrap()
            .iter()
            .rev()
            .find(|m| m.recipient_email == email)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.sent.read().unwrap().len()
    }

    /// Verification ID from the last verification link sent to an email
    pub fn verification_id(&self, email: &str) -> Option<String> {
        let mail = self.last_to(email)?;
        let (_, rest) = mail.text_body.split_once("/verifyemail/")?;
        rest.split_whitespace().next().map(str::to_string)
    }

    /// Reset code from the last reset link sent to an email
    pub fn reset_code(&self, email: &str) -> Option<String> {
        let mail = self.last_to(email)?;
        let (_, rest) = mail.text_body.split_once("code=")?;
        rest.split('&').next().map(str::to_string)
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.write().unwrap() = fail;
    }
}

impl EmailSender for MockEmailSender {
    fn send(&self, email: &OutboundEmail) -> Result<(), String> {
        if *self.fail.read().unwrap() {
            return Err("mail relay unavailable".to_string());
        }
        self.sent.write().unwrap().push(email.clone());
        Ok(())
    }
}

/// Identity provider that answers every code with a preset profile
pub struct MockProvider {
    name: Provider,
    answer: Mutex<Result<ProviderProfile, String>>,
    exchanges: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new(name: Provider) -> Self {
        Self {
            name,
            answer: Mutex::new(Err("no profile configured".to_string())),
            exchanges: Mutex::new(Vec::new()),
        }
    }

    pub fn returns(&self, profile: ProviderProfile) {
        *self.answer.lock().unwrap() = Ok(profile);
    }

    pub fn fails(&self, reason: &str) {
        *self.answer.lock().unwrap() = Err(reason.to_string());
    }

    /// Codes exchanged so far
    pub fn exchanges(&self) -> Vec<String> {
        self.exchanges.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProviderAdapter for MockProvider {
    fn authorization_url(&self, state: &str) -> String {
        format!("https://{}.idp.test/authorize?state={}", self.name, state)
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderProfile, ExchangeError> {
        self.exchanges.lock().unwrap().push(code.to_string());
        self.answer.lock().unwrap().clone().map_err(ExchangeError)
    }
}

/// Accepts only [`HUMAN`]
#[derive(Default)]
pub struct MockHumanVerifier;

#[async_trait]
impl HumanVerifier for MockHumanVerifier {
    async fn verify(&self, response: &str, _remote_ip: &str) -> Result<(), BrokerError> {
        if response == HUMAN {
            Ok(())
        } else {
            Err(BrokerError::InvalidHumanVerification)
        }
    }
}

/// When [`FlakySessionStore::delete_sessions`] fails
#[derive(Debug, Clone, Copy)]
enum Failure {
    Never,
    OnCall(usize),
    Always,
}

/// In-memory session store whose bulk deletes can be made to fail
pub struct FlakySessionStore {
    inner: InMemorySessionStore,
    calls: AtomicUsize,
    failure: Mutex<Failure>,
    batches: Mutex<Vec<usize>>,
}

impl FlakySessionStore {
    pub const FAILURE: &'static str = "delete_sessions failed";

    pub fn new() -> Self {
        Self {
            inner: InMemorySessionStore::new(),
            calls: AtomicUsize::new(0),
            failure: Mutex::new(Failure::Never),
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Only the `call`-th `delete_sessions` (1-based) fails
    pub fn failing_on(call: usize) -> Self {
        let store = Self::new();
        *store.failure.lock().unwrap() = Failure::OnCall(call);
        store
    }

    pub fn set_failing(&self, fail: bool) {
        *self.failure.lock().unwrap() = if fail { Failure::Always } else { Failure::Never };
    }

    /// Size of every batch passed to `delete_sessions`, in call order
    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionStore for FlakySessionStore {
    async fn create_session(&self, session: Session) -> StoreResult<()> {
        self.inner.create_session(session).await
    }

    async fn get_session(&self, session_id: &SessionId) -> StoreResult<Option<Session>> {
        self.inner.get_session(session_id).await
    }

    async fn update_session(&self, session: &Session) -> StoreResult<()> {
        self.inner.update_session(session).await
    }

    async fn delete_session(&self, session_id: &SessionId) -> StoreResult<bool> {
        self.inner.delete_session(session_id).await
    }

    async fn list_sessions(&self, user_id: &UserId) -> StoreResult<Vec<Session>> {
        self.inner.list_sessions(user_id).await
    }

    async fn sessions_used_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<SessionId>> {
        self.inner.sessions_used_before(cutoff).await
    }

    async fn delete_sessions(&self, ids: &[SessionId]) -> StoreResult<u64> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.batches.lock().unwrap().push(ids.len());
        let fails = match *self.failure.lock().unwrap() {
            Failure::Never => false,
            Failure::OnCall(n) => n == call,
            Failure::Always => true,
        };
        if fails {
            return Err(BrokerError::Internal(Self::FAILURE.into()));
        }
        self.inner.delete_sessions(ids).await
    }

    async fn create_login_token(&self, token: BearerToken) -> StoreResult<()> {
        self.inner.create_login_token(token).await
    }

    async fn take_login_token(&self, token: &str) -> StoreResult<Option<BearerToken>> {
        self.inner.take_login_token(token).await
    }

    async fn login_tokens_expired_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
        self.inner.login_tokens_expired_before(cutoff).await
    }

    async fn delete_login_tokens(&self, tokens: &[String]) -> StoreResult<u64> {
        self.inner.delete_login_tokens(tokens).await
    }

    async fn create_merge_token(&self, token: BearerToken) -> StoreResult<()> {
        self.inner.create_merge_token(token).await
    }

    async fn get_merge_token(&self, token: &str) -> StoreResult<Option<BearerToken>> {
        self.inner.get_merge_token(token).await
    }

    async fn merge_tokens_expired_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
        self.inner.merge_tokens_expired_before(cutoff).await
    }

    async fn delete_merge_tokens(&self, tokens: &[String]) -> StoreResult<u64> {
        self.inner.delete_merge_tokens(tokens).await
    }
}

/// Broker wired to mock collaborators, over in-memory stores unless others are supplied
pub struct Harness<U = InMemoryUserStore, S = InMemorySessionStore> {
    pub state: Arc<AppState<U, S, MockEmailSender>>,
    pub emails: MockEmailSender,
    pub clock: Arc<ManualClock>,
    providers: Vec<(Provider, Arc<MockProvider>)>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(
            Arc::new(InMemoryUserStore::new()),
            Arc::new(InMemorySessionStore::new()),
            false,
        )
    }

    /// Broker that takes the client IP from `X-Forwarded-For`
    pub fn behind_proxy() -> Self {
        Self::build(
            Arc::new(InMemoryUserStore::new()),
            Arc::new(InMemorySessionStore::new()),
            true,
        )
    }
}

impl<U: UserStore + 'static, S: SessionStore + 'static> Harness<U, S> {
    pub fn with_stores(user_store: Arc<U>, session_store: Arc<S>) -> Self {
        Self::build(user_store, session_store, false)
    }

    fn build(user_store: Arc<U>, session_store: Arc<S>, trust_proxy: bool) -> Self {
        let emails = MockEmailSender::new();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()));

        let mut registry = ProviderRegistry::new();
        let mut providers = Vec::new();
        for provider in Provider::ALL {
            let mock = Arc::new(MockProvider::new(provider));
            registry.register(provider, mock.clone());
            providers.push((provider, mock));
        }

        let signer = TokenSigner::new(KeyPair::generate(), "linkauth-test");
        let state = AppState::with_shared_stores(signer, user_store, session_store, emails.clone())
            .with_providers(registry)
            .with_human_verifier(Arc::new(MockHumanVerifier))
            .with_clock(clock.clone())
            .with_site_url("https://app.test")
            .with_trusted_proxy(trust_proxy);

        Self {
            state: Arc::new(state),
            emails,
            clock,
            providers,
        }
    }

    pub fn provider(&self, provider: Provider) -> &MockProvider {
        self.providers
            .iter()
            .find(|(p, _)| *p == provider)
            .map(|(_, mock)| mock.as_ref())
            .unwrap()
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(routes::create_router(self.state.clone())).expect("Failed to create test server")
    }

    pub fn caller(&self, tokens: &SessionTokens) -> Caller {
        self.state
            .caller_from_token(&tokens.auth_token)
            .expect("auth token should verify")
    }

    /// Run a provider flow for `purpose` that exchanges to `profile`
    pub async fn connect(
        &self,
        provider: Provider,
        purpose: Purpose,
        profile: ProviderProfile,
        caller: Option<&Caller>,
    ) -> Result<ConnectionOutcome, BrokerError> {
        self.provider(provider).returns(profile);
        let started = self.state.start_connection(provider, purpose, None).await?;
        self.state
            .complete_connection(provider, &started.state, "code-123", caller, client())
            .await
    }

    /// Register through a provider and confirm with the profile's own details
    pub async fn register_with_provider(&self, provider: Provider, profile: ProviderProfile) -> SessionTokens {
        let outcome = self
            .connect(provider, Purpose::Register, profile, None)
            .await
            .expect("provider registration should stage");
        let ConnectionOutcome::RegisterPending(pending) = outcome else {
            panic!("expected a pending registration, got {:?}", outcome);
        };

        self.state
            .register_with_provider(provider, confirmation(&pending.key, &pending.email), client())
            .await
            .expect("confirmation should succeed")
    }

    /// Register with a password and return the first session
    pub async fn register_with_password(&self, email: &str, password: &str) -> SessionTokens {
        self.state
            .register_with_password(password_registration(email, password), client())
            .await
            .expect("password registration should succeed")
    }

    /// A password user with the admin flag, logged in after the flag was set
    pub async fn admin(&self) -> (UserId, Caller) {
        let tokens = self.register_with_password("admin@example.com", "adminpassword").await;
        let mut user = self
            .state
            .user_store
            .get_user(&tokens.user_id)
            .await
            .unwrap()
            .unwrap();
        user.roles.admin = true;
        self.state.user_store.update_user(&user).await.unwrap();

        let tokens = self
            .state
            .login_with_password("admin@example.com", "adminpassword", client())
            .await
            .unwrap();
        (tokens.user_id.clone(), self.caller(&tokens))
    }
}

pub fn client() -> ClientMetadata {
    ClientMetadata {
        ip: "203.0.113.9".to_string(),
        os: "Linux".to_string(),
        browser: "Firefox 121.0".to_string(),
        is_mobile: false,
    }
}

pub fn profile(external_id: &str, email: &str, first: &str, last: &str) -> ProviderProfile {
    ProviderProfile {
        external_id: external_id.to_string(),
        email: email.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
    }
}

pub fn confirmation(key: &str, email: &str) -> RegistrationConfirmation {
    RegistrationConfirmation {
        key: key.to_string(),
        email: email.to_string(),
        first_name: "A".to_string(),
        last_name: "B".to_string(),
        human_verification: HUMAN.to_string(),
        newsletter: false,
    }
}

pub fn password_registration(email: &str, password: &str) -> linkauth_broker::auth::PasswordRegistration {
    linkauth_broker::auth::PasswordRegistration {
        email: email.to_string(),
        password: password.to_string(),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        human_verification: HUMAN.to_string(),
        newsletter: false,
    }
}
