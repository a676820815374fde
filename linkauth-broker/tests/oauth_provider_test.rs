//! Authorization-code exchange against a mock provider

use std::time::Duration;

use linkauth_broker::provider::{OAuthProvider, ProviderConfig};
use linkauth_broker::{IdentityProviderAdapter, Provider};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Well-known config for `provider` with every endpoint pointed at the mock server
fn config_for(server: &MockServer, provider: Provider) -> ProviderConfig {
    let mut config = ProviderConfig::defaults_for(
        provider,
        "client-id",
        "client-secret",
        "https://app.test/social",
    );
    config.auth_url = format!("{}/authorize", server.uri());
    config.token_url = format!("{}/token", server.uri());
    config.profile_url = format!("{}/me", server.uri());
    config
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .and(body_string_contains("client_secret=client-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "provider-access",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(server)
        .await;
}

/// Test: code, then access token, then the mapped profile
#[tokio::test]
async fn test_exchange_code_google() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer provider-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "1093",
            "email": "ada@example.com",
            "given_name": "Ada",
            "family_name": "Lovelace",
            "picture": "https://example.com/ada.png"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OAuthProvider::new(config_for(&server, Provider::Google));
    let profile = provider.exchange_code("the-code").await.unwrap();

    assert_eq!(profile.external_id, "1093");
    assert_eq!(profile.email, "ada@example.com");
    assert_eq!(profile.first_name, "Ada");
    assert_eq!(profile.last_name, "Lovelace");
}

/// Test: providers that only return a display name get it split
#[tokio::test]
async fn test_exchange_code_full_name() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": "amzn1.account.ABC",
            "email": "grace@example.com",
            "name": "Grace Hopper"
        })))
        .mount(&server)
        .await;

    let provider = OAuthProvider::new(config_for(&server, Provider::Amazon));
    let profile = provider.exchange_code("the-code").await.unwrap();

    assert_eq!(profile.external_id, "amzn1.account.ABC");
    assert_eq!(profile.first_name, "Grace");
    assert_eq!(profile.last_name, "Hopper");
}

/// Test: a refused code fails before the profile is requested
#[tokio::test]
async fn test_token_endpoint_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let provider = OAuthProvider::new(config_for(&server, Provider::Google));
    let err = provider.exchange_code("bad-code").await.unwrap_err();
    assert!(err.to_string().contains("400"));
}

/// Test: a token response without an access token is an exchange failure
#[tokio::test]
async fn test_token_response_without_access_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token_type": "Bearer" })))
        .mount(&server)
        .await;

    let provider = OAuthProvider::new(config_for(&server, Provider::Facebook));
    assert!(provider.exchange_code("the-code").await.is_err());
}

/// Test: profile endpoint failures surface as exchange failures
#[tokio::test]
async fn test_profile_endpoint_error() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let provider = OAuthProvider::new(config_for(&server, Provider::Microsoft));
    let err = provider.exchange_code("the-code").await.unwrap_err();
    assert!(err.to_string().contains("profile endpoint"));
}

/// Test: a provider slower than the configured timeout fails
#[tokio::test]
async fn test_exchange_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "late" }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let mut config = config_for(&server, Provider::Twitter);
    config.timeout_ms = 50;
    let provider = OAuthProvider::new(config);

    assert!(provider.exchange_code("the-code").await.is_err());
}

/// Test: the authorization URL points at the configured endpoint
#[tokio::test]
async fn test_authorization_url_uses_configured_endpoint() {
    let server = MockServer::start().await;
    let provider = OAuthProvider::new(config_for(&server, Provider::LinkedIn));

    let url = provider.authorization_url("abc");
    assert!(url.starts_with(&format!("{}/authorize?", server.uri())));
    assert!(url.contains("state=abc"));
    assert!(url.contains("scope=openid+profile+email"));
}
