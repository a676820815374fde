//! linkauth broker
//!
//! Identity binding, session and token issuance over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use linkauth_broker::{
    load_or_generate_keypair, routes, AppState, Config, ConsoleEmailSender, DisabledVerifier,
    EmailSender, HumanVerifier, InMemorySessionStore, InMemoryUserStore, ProviderRegistry,
    RecaptchaVerifier, SessionStore, SmtpEmailSender, SqliteStore, UserStore,
};
use linkauth_core::TokenSigner;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linkauth_broker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(
        port = config.port,
        issuer = %config.issuer,
        site_url = %config.site_url,
        database = ?config.database,
        smtp = config.smtp.is_some(),
        recaptcha = config.recaptcha_secret.is_some(),
        trust_proxy = config.trust_proxy,
        providers = ?config.providers.iter().map(|(p, _)| p.as_str()).collect::<Vec<_>>(),
        "Loaded configuration"
    );

    let keypair = load_or_generate_keypair(&config.key_file)?;
    tracing::info!(public_key = %keypair.public_key().to_base64(), "Loaded signing key");
    let signer = TokenSigner::new(keypair, config.issuer.clone());

    let email_sender: Box<dyn EmailSender> = match config.smtp.clone() {
        Some(smtp) => Box::new(
            SmtpEmailSender::new(smtp)
                .map_err(anyhow::Error::msg)
                .context("configuring SMTP")?,
        ),
        None => {
            tracing::warn!("SMTP not configured, notifications go to the console");
            Box::new(ConsoleEmailSender::new())
        }
    };

    match config.database.clone() {
        Some(path) => {
            let store = Arc::new(SqliteStore::open(&path)?);
            tracing::info!(path = %path, "Using SQLite store");
            serve(config, signer, store.clone(), store, email_sender).await
        }
        None => {
            tracing::warn!("LINKAUTH_DATABASE not set, using in-memory stores");
            serve(
                config,
                signer,
                Arc::new(InMemoryUserStore::new()),
                Arc::new(InMemorySessionStore::new()),
                email_sender,
            )
            .await
        }
    }
}

async fn serve<U, S>(
    config: Config,
    signer: TokenSigner,
    user_store: Arc<U>,
    session_store: Arc<S>,
    email_sender: Box<dyn EmailSender>,
) -> Result<()>
where
    U: UserStore + 'static,
    S: SessionStore + 'static,
{
    let timeouts = config.timeouts();
    let human_verifier: Arc<dyn HumanVerifier> = match &config.recaptcha_secret {
        Some(secret) => Arc::new(RecaptchaVerifier::new(
            secret.clone(),
            Duration::from_millis(config.provider_timeout_ms),
        )),
        None => {
            tracing::warn!("RECAPTCHA_SECRET not set, human verification disabled");
            Arc::new(DisabledVerifier)
        }
    };

    let state = Arc::new(
        AppState::with_shared_stores(signer, user_store, session_store, email_sender)
            .with_providers(ProviderRegistry::from_configs(config.providers.clone()))
            .with_human_verifier(human_verifier)
            .with_timeouts(timeouts)
            .with_site_url(config.site_url.clone())
            .with_trusted_proxy(config.trust_proxy),
    );

    let app = routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Broker listening on http://{}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
