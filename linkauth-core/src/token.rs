//! The dual-token wire format
//!
//! Two compact JWS tokens are issued per authenticated context:
//!
//! - a **SessionToken** whose subject is the session ID; it grants nothing by
//!   itself and can only be traded in for a refresh
//! - an **AuthToken** whose subject is the user ID, carrying the session ID, a
//!   unique token ID and the role flags captured when it was signed
//!
//! Both are signed with Ed25519 (`alg: EdDSA`) and must carry the configured
//! issuer. Verification is stateless.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Error, KeyPair, PublicKey, Result};

/// Issuer used when none is configured
pub const DEFAULT_ISSUER: &str = "linkauth";

const HEADER: &str = r#"{"alg":"EdDSA","typ":"JWT"}"#;

/// Role flags captured at issuance time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFlags {
    pub admin: bool,
    pub plugin_author: bool,
    pub event_author: bool,
}

/// Claims of a SessionToken
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SessionClaims {
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
    /// Session ID
    pub sub: String,
}

/// Claims of an AuthToken
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthClaims {
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
    /// User ID
    pub sub: String,
    /// Session ID
    pub ses: String,
    /// Unique token ID
    pub jti: String,
    pub adm: bool,
    pub pla: bool,
    pub iea: bool,
}

impl AuthClaims {
    pub fn roles(&self) -> RoleFlags {
        RoleFlags {
            admin: self.adm,
            plugin_author: self.pla,
            event_author: self.iea,
        }
    }
}

trait Registered {
    fn issuer(&self) -> &str;
    fn expires_at(&self) -> i64;
}

impl Registered for SessionClaims {
    fn issuer(&self) -> &str {
        &self.iss
    }

    fn expires_at(&self) -> i64 {
        self.exp
    }
}

impl Registered for AuthClaims {
    fn issuer(&self) -> &str {
        &self.iss
    }

    fn expires_at(&self) -> i64 {
        self.exp
    }
}

/// Signs and verifies both token kinds with a single key and issuer
#[derive(Debug)]
pub struct TokenSigner {
    key: KeyPair,
    public_key: PublicKey,
    issuer: String,
}

impl TokenSigner {
    pub fn new(key: KeyPair, issuer: impl Into<String>) -> Self {
        let public_key = key.public_key();
        Self {
            key,
            public_key,
            issuer: issuer.into(),
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign a SessionToken for `session_id`, valid for `ttl` from `now`
    pub fn sign_session(
        &self,
        session_id: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let claims = SessionClaims {
            iss: self.issuer.clone(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            sub: session_id.to_string(),
        };
        self.encode(&claims)
    }

    /// Sign an AuthToken. A fresh token ID is minted on every call.
    pub fn sign_auth(
        &self,
        user_id: &str,
        session_id: &str,
        roles: RoleFlags,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let claims = AuthClaims {
            iss: self.issuer.clone(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            sub: user_id.to_string(),
            ses: session_id.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            adm: roles.admin,
            pla: roles.plugin_author,
            iea: roles.event_author,
        };
        self.encode(&claims)
    }

    pub fn verify_session(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims> {
        self.decode(token, now)
    }

    pub fn verify_auth(&self, token: &str, now: DateTime<Utc>) -> Result<AuthClaims> {
        self.decode(token, now)
    }

    fn encode<C: Serialize>(&self, claims: &C) -> Result<String> {
        let header_b64 = URL_SAFE_NO_PAD.encode(HEADER);
        let claims_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);

        let message = format!("{}.{}", header_b64, claims_b64);
        let sig_b64 = URL_SAFE_NO_PAD.encode(self.key.sign(message.as_bytes()));

        Ok(format!("{}.{}", message, sig_b64))
    }

    // Structure, then signature, then issuer, then expiry.
    fn decode<C>(&self, token: &str, now: DateTime<Utc>) -> Result<C>
    where
        C: DeserializeOwned + Registered,
    {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(Error::MalformedToken("expected 3 JWT parts".into()));
        }

        let header: serde_json::Value = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[0])?)?;
        if header.get("alg").and_then(|a| a.as_str()) != Some("EdDSA") {
            return Err(Error::MalformedToken("unsupported algorithm".into()));
        }

        let message = format!("{}.{}", parts[0], parts[1]);
        let signature = URL_SAFE_NO_PAD.decode(parts[2])?;
        self.public_key.verify(message.as_bytes(), &signature)?;

        let claims: C = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1])?)?;

        if claims.issuer() != self.issuer {
            return Err(Error::IssuerMismatch {
                expected: self.issuer.clone(),
                actual: claims.issuer().to_string(),
            });
        }

        if now.timestamp() >= claims.expires_at() {
            return Err(Error::TokenExpired);
        }

        Ok(claims)
    }
}
