//! Session & token issuer

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::{auth_token_ttl, session_ttl, Caller};
use crate::crypto::generate_token;
use crate::error::BrokerError;
use crate::state::AppState;
use crate::store::{BearerToken, ClientMetadata, Session, SessionId, SessionStore, User, UserId, UserStore};

/// The token pair handed out on login, registration and refresh
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub session_token: String,
    pub auth_token: String,
}

/// A user's sessions, split into the calling one and the rest
#[derive(Debug, Clone, Serialize)]
pub struct SessionOverview {
    pub current: Option<Session>,
    /// Most recently used first
    pub others: Vec<Session>,
}

fn signing_failed(e: linkauth_core::Error) -> BrokerError {
    BrokerError::Internal(format!("token signing failed: {}", e))
}

impl<U: UserStore, S: SessionStore, E> AppState<U, S, E> {
    /// Create a session for `user` and sign both tokens
    pub async fn login(&self, user: &User, client: ClientMetadata) -> Result<SessionTokens, BrokerError> {
        let now = self.clock.now();
        let session = Session {
            id: SessionId::generate(),
            user_id: user.id.clone(),
            last_used: now,
            client,
            roles: user.roles,
        };
        self.store("session create", self.session_store.create_session(session.clone()))
            .await?;

        tracing::info!(
            user_id = %session.user_id,
            session_id = %session.id,
            ip = %session.client.ip,
            "Session created"
        );
        self.sign_tokens(&session, now)
    }

    fn sign_tokens(&self, session: &Session, now: DateTime<Utc>) -> Result<SessionTokens, BrokerError> {
        let session_token = self
            .signer
            .sign_session(&session.id.0, session_ttl(), now)
            .map_err(signing_failed)?;
        let auth_token = self
            .signer
            .sign_auth(&session.user_id.0, &session.id.0, session.roles, auth_token_ttl(), now)
            .map_err(signing_failed)?;

        Ok(SessionTokens {
            user_id: session.user_id.clone(),
            session_id: session.id.clone(),
            session_token,
            auth_token,
        })
    }

    /// Trade a SessionToken for a fresh token pair on the same session
    pub async fn refresh(&self, session_token: &str, client: ClientMetadata) -> Result<SessionTokens, BrokerError> {
        let now = self.clock.now();
        let claims = self
            .signer
            .verify_session(session_token, now)
            .map_err(|e| match e {
                linkauth_core::Error::TokenExpired => BrokerError::SessionExpired,
                other => {
                    tracing::debug!(error = %other, "Rejected session token");
                    BrokerError::Unauthenticated
                }
            })?;

        let session_id = SessionId(claims.sub);
        let mut session = self
            .store("session lookup", self.session_store.get_session(&session_id))
            .await?
            .ok_or(BrokerError::Unauthenticated)?;

        if session.last_used + session_ttl() < now {
            if let Err(e) = self
                .store("session delete", self.session_store.delete_session(&session_id))
                .await
            {
                tracing::warn!(session_id = %session_id, error = %e, "Failed to delete stale session");
            }
            return Err(BrokerError::SessionExpired);
        }

        session.client = client;
        session.last_used = now;
        self.store("session update", self.session_store.update_session(&session))
            .await?;

        tracing::debug!(session_id = %session.id, "Session refreshed");
        self.sign_tokens(&session, now)
    }

    /// End the caller's own session
    pub async fn logout(&self, caller: &Caller) -> Result<(), BrokerError> {
        let deleted = self
            .store("session delete", self.session_store.delete_session(&caller.session_id))
            .await?;
        if deleted {
            tracing::info!(user_id = %caller.user_id, session_id = %caller.session_id, "Logged out");
        }
        Ok(())
    }

    /// End one of the caller's sessions; `NotFound` unless the caller owns it
    pub async fn logout_specific(&self, caller: &Caller, session_id: &SessionId) -> Result<(), BrokerError> {
        let session = self
            .store("session lookup", self.session_store.get_session(session_id))
            .await?
            .filter(|s| s.user_id == caller.user_id)
            .ok_or(BrokerError::NotFound("session"))?;

        self.store("session delete", self.session_store.delete_session(&session.id))
            .await?;
        Ok(())
    }

    /// End every session of `user_id` except `keep`; returns how many ended
    pub async fn logout_all_except(&self, user_id: &UserId, keep: &SessionId) -> Result<u64, BrokerError> {
        self.logout_where(user_id, Some(keep)).await
    }

    pub async fn logout_all(&self, user_id: &UserId) -> Result<u64, BrokerError> {
        self.logout_where(user_id, None).await
    }

    async fn logout_where(&self, user_id: &UserId, keep: Option<&SessionId>) -> Result<u64, BrokerError> {
        let doomed: Vec<SessionId> = self
            .store("session list", self.session_store.list_sessions(user_id))
            .await?
            .into_iter()
            .map(|s| s.id)
            .filter(|id| Some(id) != keep)
            .collect();

        if doomed.is_empty() {
            return Ok(0);
        }
        let deleted = self
            .store("session delete", self.session_store.delete_sessions(&doomed))
            .await?;

        tracing::info!(user_id = %user_id, deleted, "Logged out other sessions");
        Ok(deleted)
    }

    pub async fn list_sessions(&self, caller: &Caller) -> Result<SessionOverview, BrokerError> {
        let mut sessions = self
            .store("session list", self.session_store.list_sessions(&caller.user_id))
            .await?;
        sessions.sort_by(|a, b| b.last_used.cmp(&a.last_used));

        let position = sessions.iter().position(|s| s.id == caller.session_id);
        let current = position.map(|i| sessions.remove(i));
        Ok(SessionOverview { current, others: sessions })
    }

    /// Mint a single-use login token for deferred login
    pub async fn issue_login_token(&self, user_id: &UserId, ttl: Duration) -> Result<String, BrokerError> {
        let token = self.bearer(user_id, ttl);
        let value = token.token.clone();
        self.store("login token create", self.session_store.create_login_token(token))
            .await?;
        Ok(value)
    }

    pub async fn issue_merge_token(&self, user_id: &UserId, ttl: Duration) -> Result<String, BrokerError> {
        let token = self.bearer(user_id, ttl);
        let value = token.token.clone();
        self.store("merge token create", self.session_store.create_merge_token(token))
            .await?;
        Ok(value)
    }

    fn bearer(&self, user_id: &UserId, ttl: Duration) -> BearerToken {
        BearerToken {
            token: generate_token(),
            user_id: user_id.clone(),
            expires_at: self.clock.now() + ttl,
        }
    }

    /// Redeem a login token once and log its user in
    pub async fn redeem_login_token(&self, token: &str, client: ClientMetadata) -> Result<SessionTokens, BrokerError> {
        let record = self
            .store("login token take", self.session_store.take_login_token(token))
            .await?
            .ok_or(BrokerError::NotFound("login token"))?;

        if record.expires_at < self.clock.now() {
            return Err(BrokerError::TokenExpired);
        }

        let user = self
            .store("user lookup", self.user_store.get_user(&record.user_id))
            .await?
            .ok_or(BrokerError::NotFound("user"))?;
        self.login(&user, client).await
    }
}
