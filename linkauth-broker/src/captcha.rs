//! Human verification for registrations

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::BrokerError;

pub const RECAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

/// Checks a human-verification response token
#[async_trait]
pub trait HumanVerifier: Send + Sync {
    /// `Ok(())` if the token proves a human; `InvalidHumanVerification` if not
    async fn verify(&self, response: &str, remote_ip: &str) -> Result<(), BrokerError>;
}

/// Accepts every response. Used when no reCAPTCHA secret is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledVerifier;

#[async_trait]
impl HumanVerifier for DisabledVerifier {
    async fn verify(&self, _response: &str, _remote_ip: &str) -> Result<(), BrokerError> {
        Ok(())
    }
}

#[derive(Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Google reCAPTCHA site-verify client
pub struct RecaptchaVerifier {
    secret: String,
    verify_url: String,
    client: Client,
}

impl RecaptchaVerifier {
    pub fn new(secret: impl Into<String>, timeout: Duration) -> Self {
        Self::with_endpoint(secret, RECAPTCHA_VERIFY_URL, timeout)
    }

    pub fn with_endpoint(secret: impl Into<String>, verify_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            secret: secret.into(),
            verify_url: verify_url.into(),
            client,
        }
    }
}

#[async_trait]
impl HumanVerifier for RecaptchaVerifier {
    async fn verify(&self, response: &str, remote_ip: &str) -> Result<(), BrokerError> {
        if response.is_empty() {
            return Err(BrokerError::InvalidHumanVerification);
        }

        let form = [
            ("secret", self.secret.as_str()),
            ("response", response),
            ("remoteip", remote_ip),
        ];
        let result: SiteVerifyResponse = self
            .client
            .post(&self.verify_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| BrokerError::Upstream(format!("reCAPTCHA request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| BrokerError::Upstream(format!("invalid reCAPTCHA response: {}", e)))?;

        if !result.success {
            tracing::info!(errors = ?result.error_codes, "Human verification rejected");
            return Err(BrokerError::InvalidHumanVerification);
        }
        Ok(())
    }
}
