//! In-memory storage implementations

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    BearerToken, Credential, EmailVerification, ExternalLink, PasswordReset, PendingConnection,
    PendingRegistration, Session, SessionId, SessionStore, StoreResult, User, UserId, UserStore,
};
use crate::error::BrokerError;
use crate::provider::Provider;

fn read<T>(lock: &RwLock<T>) -> StoreResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| BrokerError::Internal("store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> StoreResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| BrokerError::Internal("store lock poisoned".to_string()))
}

/// In-memory user store
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<UserId, User>>,
    /// Keyed by lowercased email
    credentials: RwLock<HashMap<String, Credential>>,
    links: RwLock<HashMap<(Provider, String), ExternalLink>>,
    connections: RwLock<HashMap<String, PendingConnection>>,
    registrations: RwLock<HashMap<String, PendingRegistration>>,
    resets: RwLock<HashMap<UserId, PasswordReset>>,
    verifications: RwLock<HashMap<String, EmailVerification>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending connections (for testing purposes)
    pub fn pending_connections(&self) -> usize {
        read(&self.connections).map(|c| c.len()).unwrap_or_default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create_user(&self, user: User) -> StoreResult<()> {
        let mut users = write(&self.users)?;
        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(BrokerError::EmailInUse);
        }
        users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn get_user(&self, user_id: &UserId) -> StoreResult<Option<User>> {
        Ok(read(&self.users)?.get(user_id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(read(&self.users)?
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        let mut users = write(&self.users)?;
        match users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(BrokerError::NotFound("user")),
        }
    }

    async fn create_credential(&self, credential: Credential) -> StoreResult<()> {
        let key = credential.email.to_lowercase();
        let mut credentials = write(&self.credentials)?;
        if credentials.contains_key(&key) {
            return Err(BrokerError::EmailInUse);
        }
        credentials.insert(
            key.clone(),
            Credential {
                email: key,
                ..credential
            },
        );
        Ok(())
    }

    async fn get_credential_by_email(&self, email: &str) -> StoreResult<Option<Credential>> {
        Ok(read(&self.credentials)?.get(&email.to_lowercase()).cloned())
    }

    async fn get_credential_by_user(&self, user_id: &UserId) -> StoreResult<Option<Credential>> {
        Ok(read(&self.credentials)?
            .values()
            .find(|c| &c.user_id == user_id)
            .cloned())
    }

    async fn update_credential(&self, credential: &Credential) -> StoreResult<()> {
        let key = credential.email.to_lowercase();
        let mut credentials = write(&self.credentials)?;
        if credentials
            .get(&key)
            .is_some_and(|c| c.user_id != credential.user_id)
        {
            return Err(BrokerError::EmailInUse);
        }
        let old = credentials
            .iter()
            .find(|(_, c)| c.user_id == credential.user_id)
            .map(|(k, _)| k.clone())
            .ok_or(BrokerError::NotFound("credential"))?;
        credentials.remove(&old);
        credentials.insert(
            key.clone(),
            Credential {
                email: key,
                ..credential.clone()
            },
        );
        Ok(())
    }

    async fn delete_credential(&self, user_id: &UserId) -> StoreResult<bool> {
        let mut credentials = write(&self.credentials)?;
        let before = credentials.len();
        credentials.retain(|_, c| &c.user_id != user_id);
        Ok(credentials.len() != before)
    }

    async fn create_link(&self, link: ExternalLink) -> StoreResult<()> {
        let mut links = write(&self.links)?;
        let key = (link.provider, link.external_id.clone());
        if links.contains_key(&key)
            || links
                .values()
                .any(|l| l.provider == link.provider && l.user_id == link.user_id)
        {
            return Err(BrokerError::AlreadyLinked);
        }
        links.insert(key, link);
        Ok(())
    }

    async fn get_link(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> StoreResult<Option<ExternalLink>> {
        Ok(read(&self.links)?
            .get(&(provider, external_id.to_string()))
            .cloned())
    }

    async fn get_link_for_user(
        &self,
        provider: Provider,
        user_id: &UserId,
    ) -> StoreResult<Option<ExternalLink>> {
        Ok(read(&self.links)?
            .values()
            .find(|l| l.provider == provider && &l.user_id == user_id)
            .cloned())
    }

    async fn delete_link(&self, provider: Provider, user_id: &UserId) -> StoreResult<bool> {
        let mut links = write(&self.links)?;
        let before = links.len();
        links.retain(|_, l| !(l.provider == provider && &l.user_id == user_id));
        Ok(links.len() != before)
    }

    async fn create_connection(&self, connection: PendingConnection) -> StoreResult<()> {
        write(&self.connections)?.insert(connection.state.clone(), connection);
        Ok(())
    }

    async fn take_connection(&self, state: &str) -> StoreResult<Option<PendingConnection>> {
        Ok(write(&self.connections)?.remove(state))
    }

    async fn create_registration(&self, registration: PendingRegistration) -> StoreResult<()> {
        write(&self.registrations)?.insert(registration.key.clone(), registration);
        Ok(())
    }

    async fn take_registration(&self, key: &str) -> StoreResult<Option<PendingRegistration>> {
        Ok(write(&self.registrations)?.remove(key))
    }

    async fn put_password_reset(&self, reset: PasswordReset) -> StoreResult<()> {
        write(&self.resets)?.insert(reset.user_id.clone(), reset);
        Ok(())
    }

    async fn get_password_reset(&self, user_id: &UserId) -> StoreResult<Option<PasswordReset>> {
        Ok(read(&self.resets)?.get(user_id).cloned())
    }

    async fn take_password_reset(&self, user_id: &UserId) -> StoreResult<Option<PasswordReset>> {
        Ok(write(&self.resets)?.remove(user_id))
    }

    async fn put_email_verification(&self, verification: EmailVerification) -> StoreResult<()> {
        let mut verifications = write(&self.verifications)?;
        verifications.retain(|_, v| v.user_id != verification.user_id);
        verifications.insert(verification.id.clone(), verification);
        Ok(())
    }

    async fn take_email_verification(&self, id: &str) -> StoreResult<Option<EmailVerification>> {
        Ok(write(&self.verifications)?.remove(id))
    }

    async fn purge_ephemeral(
        &self,
        connections_before: DateTime<Utc>,
        registrations_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut removed = 0;

        let mut connections = write(&self.connections)?;
        let before = connections.len();
        connections.retain(|_, c| c.created_at >= connections_before);
        removed += before - connections.len();
        drop(connections);

        let mut registrations = write(&self.registrations)?;
        let before = registrations.len();
        registrations.retain(|_, r| r.created_at >= registrations_before);
        removed += before - registrations.len();
        drop(registrations);

        let mut resets = write(&self.resets)?;
        let before = resets.len();
        resets.retain(|_, r| r.expires_at >= now);
        removed += before - resets.len();
        drop(resets);

        let mut verifications = write(&self.verifications)?;
        let before = verifications.len();
        verifications.retain(|_, v| v.expires_at >= now);
        removed += before - verifications.len();

        Ok(removed as u64)
    }
}

/// In-memory session store
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    login_tokens: RwLock<HashMap<String, BearerToken>>,
    merge_tokens: RwLock<HashMap<String, BearerToken>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn expired_before(tokens: &HashMap<String, BearerToken>, cutoff: DateTime<Utc>) -> Vec<String> {
    tokens
        .values()
        .filter(|t| t.expires_at < cutoff)
        .map(|t| t.token.clone())
        .collect()
}

fn remove_all<K, V>(map: &mut HashMap<K, V>, keys: &[K]) -> u64
where
    K: std::hash::Hash + Eq,
{
    keys.iter().filter(|k| map.remove(k).is_some()).count() as u64
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, session: Session) -> StoreResult<()> {
        write(&self.sessions)?.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get_session(&self, session_id: &SessionId) -> StoreResult<Option<Session>> {
        Ok(read(&self.sessions)?.get(session_id).cloned())
    }

    async fn update_session(&self, session: &Session) -> StoreResult<()> {
        let mut sessions = write(&self.sessions)?;
        match sessions.get_mut(&session.id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(BrokerError::NotFound("session")),
        }
    }

    async fn delete_session(&self, session_id: &SessionId) -> StoreResult<bool> {
        Ok(write(&self.sessions)?.remove(session_id).is_some())
    }

    async fn list_sessions(&self, user_id: &UserId) -> StoreResult<Vec<Session>> {
        let mut sessions: Vec<Session> = read(&self.sessions)?
            .values()
            .filter(|s| &s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        Ok(sessions)
    }

    async fn sessions_used_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<SessionId>> {
        Ok(read(&self.sessions)?
            .values()
            .filter(|s| s.last_used < cutoff)
            .map(|s| s.id.clone())
            .collect())
    }

    async fn delete_sessions(&self, ids: &[SessionId]) -> StoreResult<u64> {
        Ok(remove_all(&mut *write(&self.sessions)?, ids))
    }

    async fn create_login_token(&self, token: BearerToken) -> StoreResult<()> {
        write(&self.login_tokens)?.insert(token.token.clone(), token);
        Ok(())
    }

    async fn take_login_token(&self, token: &str) -> StoreResult<Option<BearerToken>> {
        Ok(write(&self.login_tokens)?.remove(token))
    }

    async fn login_tokens_expired_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
        Ok(expired_before(&*read(&self.login_tokens)?, cutoff))
    }

    async fn delete_login_tokens(&self, tokens: &[String]) -> StoreResult<u64> {
        Ok(remove_all(&mut *write(&self.login_tokens)?, tokens))
    }

    async fn create_merge_token(&self, token: BearerToken) -> StoreResult<()> {
        write(&self.merge_tokens)?.insert(token.token.clone(), token);
        Ok(())
    }

    async fn get_merge_token(&self, token: &str) -> StoreResult<Option<BearerToken>> {
        Ok(read(&self.merge_tokens)?.get(token).cloned())
    }

    async fn merge_tokens_expired_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
        Ok(expired_before(&*read(&self.merge_tokens)?, cutoff))
    }

    async fn delete_merge_tokens(&self, tokens: &[String]) -> StoreResult<u64> {
        Ok(remove_all(&mut *write(&self.merge_tokens)?, tokens))
    }
}
