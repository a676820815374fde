//! External identity providers
//!
//! Every provider is reduced to the same capability: build an authorization
//! URL for a state token, and exchange the code the provider redirects back
//! with for a normalized profile. Endpoints, scopes, and profile field names
//! are configuration data (see [`oauth::ProviderConfig`]), so the login flow
//! exists exactly once.

pub mod oauth;

pub use oauth::{OAuthProvider, ProfileMapping, ProviderConfig};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

/// Supported identity providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Facebook,
    Twitter,
    LinkedIn,
    Microsoft,
    Amazon,
}

impl Provider {
    pub const ALL: [Provider; 6] = [
        Provider::Google,
        Provider::Facebook,
        Provider::Twitter,
        Provider::LinkedIn,
        Provider::Microsoft,
        Provider::Amazon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Facebook => "facebook",
            Provider::Twitter => "twitter",
            Provider::LinkedIn => "linkedin",
            Provider::Microsoft => "microsoft",
            Provider::Amazon => "amazon",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| BrokerError::Validation(format!("unknown provider: {}", s)))
    }
}

/// Profile returned by a provider after a successful code exchange
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub external_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Why an exchange failed
#[derive(Debug)]
pub struct ExchangeError(pub String);

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One identity provider
#[async_trait]
pub trait IdentityProviderAdapter: Send + Sync {
    /// URL the user agent is sent to, carrying `state`
    fn authorization_url(&self, state: &str) -> String;

    /// Trade an authorization code for the user's profile
    async fn exchange_code(&self, code: &str) -> Result<ProviderProfile, ExchangeError>;
}

/// Adapters by provider
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<Provider, Arc<dyn IdentityProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry of HTTP adapters from configuration
    pub fn from_configs(configs: impl IntoIterator<Item = (Provider, ProviderConfig)>) -> Self {
        let mut registry = Self::new();
        for (provider, config) in configs {
            registry.register(provider, Arc::new(OAuthProvider::new(config)));
        }
        registry
    }

    pub fn register(&mut self, provider: Provider, adapter: Arc<dyn IdentityProviderAdapter>) {
        self.adapters.insert(provider, adapter);
    }

    pub fn get(&self, provider: Provider) -> Result<&Arc<dyn IdentityProviderAdapter>, BrokerError> {
        self.adapters
            .get(&provider)
            .ok_or(BrokerError::ProviderNotConfigured(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse_roundtrip() {
        for provider in Provider::ALL {
            assert_eq!(provider.as_str().parse::<Provider>().unwrap(), provider);
        }
        assert_eq!("LinkedIn".parse::<Provider>().unwrap(), Provider::LinkedIn);
        assert!("myspace".parse::<Provider>().is_err());
    }

    #[test]
    fn test_unconfigured_provider() {
        let registry = ProviderRegistry::new();
        assert!(matches!(
            registry.get(Provider::Google),
            Err(BrokerError::ProviderNotConfigured(Provider::Google))
        ));
    }
}
