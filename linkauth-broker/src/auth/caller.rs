//! Caller context
//!
//! The AuthToken is verified once per request and turned into a [`Caller`].
//! Everything downstream receives the caller explicitly; nothing else reads
//! the `Authorization` header.

use axum::http::{header, HeaderMap};
use linkauth_core::AuthClaims;

use crate::error::BrokerError;
use crate::state::AppState;
use crate::store::{RoleFlags, SessionId, UserId};

/// Identity of an authenticated request, taken from its AuthToken claims
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub token_id: String,
    /// Role flags as of token issuance
    pub roles: RoleFlags,
}

impl Caller {
    pub fn from_claims(claims: AuthClaims) -> Self {
        let roles = claims.roles();
        Self {
            user_id: UserId(claims.sub),
            session_id: SessionId(claims.ses),
            token_id: claims.jti,
            roles,
        }
    }

    pub fn require_admin(&self) -> Result<(), BrokerError> {
        if self.roles.admin {
            Ok(())
        } else {
            Err(BrokerError::Forbidden)
        }
    }
}

/// Value of an `Authorization: Bearer` header, if any
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

impl<U, S, E> AppState<U, S, E> {
    /// Verify an AuthToken; any failure means an anonymous caller
    pub fn caller_from_token(&self, token: &str) -> Option<Caller> {
        match self.signer.verify_auth(token, self.clock.now()) {
            Ok(claims) => Some(Caller::from_claims(claims)),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring invalid auth token");
                None
            }
        }
    }

    pub fn caller_from_headers(&self, headers: &HeaderMap) -> Option<Caller> {
        bearer_token(headers).and_then(|token| self.caller_from_token(token))
    }
}
