//! Generic authorization-code adapter
//!
//! All six providers are driven by this one adapter. What differs between
//! them (endpoints, scopes, where the profile keeps its fields) lives in
//! [`ProviderConfig`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::{ExchangeError, IdentityProviderAdapter, Provider, ProviderProfile};

/// Where to find each profile field in the provider's JSON (dotted paths)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileMapping {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Used when the provider only returns a display name, split on the first space
    pub full_name: Option<String>,
}

impl ProfileMapping {
    fn split(id: &str, email: &str, first: &str, last: &str) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            first_name: Some(first.into()),
            last_name: Some(last.into()),
            full_name: None,
        }
    }

    fn full(id: &str, email: &str, name: &str) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            first_name: None,
            last_name: None,
            full_name: Some(name.into()),
        }
    }

    /// Extract a normalized profile; missing fields become empty strings
    pub fn extract(&self, body: &Value) -> ProviderProfile {
        let (mut first_name, mut last_name) = (
            self.first_name
                .as_deref()
                .map(|p| lookup(body, p))
                .unwrap_or_default(),
            self.last_name
                .as_deref()
                .map(|p| lookup(body, p))
                .unwrap_or_default(),
        );

        if let Some(path) = &self.full_name {
            let name = lookup(body, path);
            let mut parts = name.trim().splitn(2, ' ');
            first_name = parts.next().unwrap_or_default().to_string();
            last_name = parts.next().unwrap_or_default().trim().to_string();
        }

        ProviderProfile {
            external_id: lookup(body, &self.id),
            email: lookup(body, &self.email),
            first_name,
            last_name,
        }
    }
}

fn lookup(body: &Value, path: &str) -> String {
    let mut current = body;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => match map.get(segment) {
                Some(v) => v,
                None => return String::new(),
            },
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(v) => v,
                None => return String::new(),
            },
            _ => return String::new(),
        };
    }
    match current {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Client registration and endpoints for one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub profile_url: String,
    pub scopes: Vec<String>,
    pub mapping: ProfileMapping,
    /// Upper bound on each HTTP call of the exchange
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl ProviderConfig {
    /// Well-known endpoints, scopes and field mapping for a provider
    pub fn defaults_for(
        provider: Provider,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        let (auth_url, token_url, profile_url, scopes, mapping): (&str, &str, &str, &[&str], _) =
            match provider {
                Provider::Google => (
                    "https://accounts.google.com/o/oauth2/v2/auth",
                    "https://oauth2.googleapis.com/token",
                    "https://www.googleapis.com/oauth2/v3/userinfo",
                    &["email", "profile"],
                    ProfileMapping::split("sub", "email", "given_name", "family_name"),
                ),
                Provider::Facebook => (
                    "https://www.facebook.com/v18.0/dialog/oauth",
                    "https://graph.facebook.com/v18.0/oauth/access_token",
                    "https://graph.facebook.com/v18.0/me?fields=id,first_name,last_name,email",
                    &["email", "public_profile"],
                    ProfileMapping::split("id", "email", "first_name", "last_name"),
                ),
                Provider::Twitter => (
                    "https://twitter.com/i/oauth2/authorize",
                    "https://api.twitter.com/2/oauth2/token",
                    "https://api.twitter.com/1.1/account/verify_credentials.json?include_entities=false&skip_status=true&include_email=true",
                    &["users.read", "tweet.read"],
                    ProfileMapping::full("id_str", "email", "name"),
                ),
                Provider::LinkedIn => (
                    "https://www.linkedin.com/oauth/v2/authorization",
                    "https://www.linkedin.com/oauth/v2/accessToken",
                    "https://api.linkedin.com/v2/userinfo",
                    &["openid", "profile", "email"],
                    ProfileMapping::split("sub", "email", "given_name", "family_name"),
                ),
                Provider::Microsoft => (
                    "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
                    "https://login.microsoftonline.com/common/oauth2/v2.0/token",
                    "https://graph.microsoft.com/v1.0/me",
                    &["User.Read"],
                    ProfileMapping::split("id", "mail", "givenName", "surname"),
                ),
                Provider::Amazon => (
                    "https://www.amazon.com/ap/oa",
                    "https://api.amazon.com/auth/o2/token",
                    "https://api.amazon.com/user/profile",
                    &["profile"],
                    ProfileMapping::full("user_id", "email", "name"),
                ),
            };

        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_url: redirect_url.into(),
            auth_url: auth_url.into(),
            token_url: token_url.into(),
            profile_url: profile_url.into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            mapping,
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// HTTP adapter for an OAuth 2.0 authorization-code provider
pub struct OAuthProvider {
    config: ProviderConfig,
    client: Client,
}

impl OAuthProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }
}

#[async_trait]
impl IdentityProviderAdapter for OAuthProvider {
    fn authorization_url(&self, state: &str) -> String {
        let scope = self.config.scopes.join(" ");
        let params = [
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("scope", scope.as_str()),
            ("state", state),
        ];
        match Url::parse_with_params(&self.config.auth_url, &params) {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::error!(auth_url = %self.config.auth_url, error = %e, "Invalid provider authorization URL");
                self.config.auth_url.clone()
            }
        }
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderProfile, ExchangeError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| ExchangeError(format!("token request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(ExchangeError(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ExchangeError(format!("invalid token response: {}", e)))?;

        let response = self
            .client
            .get(&self.config.profile_url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| ExchangeError(format!("profile request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(ExchangeError(format!(
                "profile endpoint returned {}",
                response.status()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| ExchangeError(format!("invalid profile response: {}", e)))?;

        Ok(self.config.mapping.extract(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_name_mapping() {
        let mapping = ProfileMapping::split("sub", "email", "given_name", "family_name");
        let profile = mapping.extract(&json!({
            "sub": "1234",
            "email": "a@example.org",
            "given_name": "Ada",
            "family_name": "Lovelace"
        }));
        assert_eq!(profile.external_id, "1234");
        assert_eq!(profile.email, "a@example.org");
        assert_eq!(profile.first_name, "Ada");
        assert_eq!(profile.last_name, "Lovelace");
    }

    #[test]
    fn test_full_name_split_on_first_space() {
        let mapping = ProfileMapping::full("user_id", "email", "name");
        let profile = mapping.extract(&json!({
            "user_id": "amzn1.account.X",
            "email": "a@example.org",
            "name": "Grace Brewster Hopper"
        }));
        assert_eq!(profile.first_name, "Grace");
        assert_eq!(profile.last_name, "Brewster Hopper");
    }

    #[test]
    fn test_single_word_name_has_empty_last_name() {
        let mapping = ProfileMapping::full("id_str", "email", "name");
        let profile = mapping.extract(&json!({ "id_str": "9", "email": "t@example.org", "name": "Cher" }));
        assert_eq!(profile.first_name, "Cher");
        assert_eq!(profile.last_name, "");
    }

    #[test]
    fn test_nested_and_numeric_fields() {
        let mapping = ProfileMapping::split("data.id", "emails.account", "first", "last");
        let profile = mapping.extract(&json!({
            "data": { "id": 42 },
            "emails": { "account": "m@example.org" }
        }));
        assert_eq!(profile.external_id, "42");
        assert_eq!(profile.email, "m@example.org");
        assert_eq!(profile.first_name, "");
    }

    #[test]
    fn test_authorization_url_carries_state() {
        let provider = OAuthProvider::new(ProviderConfig::defaults_for(
            Provider::Google,
            "client",
            "secret",
            "https://app.example/social",
        ));
        let url = Url::parse(&provider.authorization_url("state-123")).unwrap();

        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["state"], "state-123");
        assert_eq!(params["client_id"], "client");
        assert_eq!(params["redirect_uri"], "https://app.example/social");
        assert_eq!(params["scope"], "email profile");
        assert_eq!(params["response_type"], "code");
    }
}
