//! Broker configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use linkauth_core::{KeyPair, DEFAULT_ISSUER};
use serde::Deserialize;

use crate::deadline::Timeouts;
use crate::email::SmtpConfig;
use crate::error::BrokerError;
use crate::provider::{Provider, ProviderConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Port to listen on
    pub port: u16,

    /// Issuer claim every token must carry
    pub issuer: String,

    /// File holding the Ed25519 signing seed
    pub key_file: PathBuf,

    /// SQLite database path; in-memory stores when unset
    pub database: Option<String>,

    /// Public base URL used in email links
    pub site_url: String,

    pub store_timeout_ms: u64,

    pub provider_timeout_ms: u64,

    /// Take the client IP from `X-Forwarded-For` instead of the peer address
    pub trust_proxy: bool,

    /// reCAPTCHA secret; human verification is disabled when unset
    pub recaptcha_secret: Option<String>,

    /// SMTP configuration; emails go to the console when unset
    pub smtp: Option<SmtpConfig>,

    /// Identity providers with client credentials present
    pub providers: Vec<(Provider, ProviderConfig)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            issuer: DEFAULT_ISSUER.to_string(),
            key_file: PathBuf::from("linkauth-key.seed"),
            database: None,
            site_url: "http://localhost:3000".to_string(),
            store_timeout_ms: 5_000,
            provider_timeout_ms: 10_000,
            trust_proxy: false,
            recaptcha_secret: None,
            smtp: None,
            providers: Vec::new(),
        }
    }
}

pub(crate) fn get_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

impl Config {
    /// Build configuration from environment variables, falling back to defaults
    ///
    /// - PORT, LINKAUTH_ISSUER, LINKAUTH_KEY_FILE, LINKAUTH_DATABASE, LINKAUTH_SITE_URL
    /// - LINKAUTH_STORE_TIMEOUT_MS, LINKAUTH_PROVIDER_TIMEOUT_MS
    /// - LINKAUTH_TRUST_PROXY (`true`/`1` when running behind a reverse proxy)
    /// - RECAPTCHA_SECRET
    /// - SMTP_* (see [`SmtpConfig::from_env`])
    /// - `<PROVIDER>_CLIENT_ID`, `<PROVIDER>_CLIENT_SECRET`, `<PROVIDER>_REDIRECT_URL`
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let site_url = get_env("LINKAUTH_SITE_URL").unwrap_or(defaults.site_url);
        let provider_timeout_ms = get_env("LINKAUTH_PROVIDER_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.provider_timeout_ms);

        let providers = Provider::ALL
            .into_iter()
            .filter_map(|provider| {
                let prefix = provider.as_str().to_uppercase();
                let client_id = get_env(&format!("{}_CLIENT_ID", prefix))?;
                let client_secret = get_env(&format!("{}_CLIENT_SECRET", prefix))?;
                let redirect_url = get_env(&format!("{}_REDIRECT_URL", prefix)).unwrap_or_else(|| {
                    format!("{}/auth/{}/callback", site_url.trim_end_matches('/'), provider)
                });

                let mut config =
                    ProviderConfig::defaults_for(provider, client_id, client_secret, redirect_url);
                config.timeout_ms = provider_timeout_ms;
                Some((provider, config))
            })
            .collect();

        Self {
            port: get_env("PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            issuer: get_env("LINKAUTH_ISSUER").unwrap_or(defaults.issuer),
            key_file: get_env("LINKAUTH_KEY_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.key_file),
            database: get_env("LINKAUTH_DATABASE"),
            site_url,
            store_timeout_ms: get_env("LINKAUTH_STORE_TIMEOUT_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.store_timeout_ms),
            provider_timeout_ms,
            trust_proxy: get_env("LINKAUTH_TRUST_PROXY")
                .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes")),
            recaptcha_secret: get_env("RECAPTCHA_SECRET"),
            smtp: SmtpConfig::from_env(),
            providers,
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            store: Duration::from_millis(self.store_timeout_ms),
            provider: Duration::from_millis(self.provider_timeout_ms),
        }
    }
}

/// Load the signing key from `path`, or generate one and write its seed there
pub fn load_or_generate_keypair(path: &Path) -> Result<KeyPair, BrokerError> {
    if path.exists() {
        let seed = std::fs::read_to_string(path)
            .map_err(|e| BrokerError::Internal(format!("reading {}: {}", path.display(), e)))?;
        return KeyPair::from_base64_seed(seed.trim())
            .map_err(|e| BrokerError::Internal(format!("invalid key file {}: {}", path.display(), e)));
    }

    let keypair = KeyPair::generate();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| BrokerError::Internal(format!("creating {}: {}", parent.display(), e)))?;
    }
    std::fs::write(path, keypair.seed_base64())
        .map_err(|e| BrokerError::Internal(format!("writing {}: {}", path.display(), e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| BrokerError::Internal(format!("securing {}: {}", path.display(), e)))?;
    }

    tracing::info!(path = %path.display(), "Generated new signing key");
    Ok(keypair)
}
