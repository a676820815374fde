//! Login-method census and the last-login-method guard
//!
//! The password credential and every provider link are looked up
//! concurrently; the guard waits for all of them before deciding. Two
//! concurrent detaches can still both pass the guard, since the store offers
//! no multi-record transactions.

use futures::future::{join, join_all};
use serde::Serialize;

use crate::error::BrokerError;
use crate::provider::Provider;
use crate::state::AppState;
use crate::store::{Credential, ExternalLink, SessionStore, StoreResult, UserId, UserStore};

/// Which login methods a user currently has
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoginMethods {
    pub password: bool,
    pub google: bool,
    pub facebook: bool,
    pub twitter: bool,
    pub linkedin: bool,
    pub microsoft: bool,
    pub amazon: bool,
}

impl LoginMethods {
    pub fn has(&self, provider: Provider) -> bool {
        match provider {
            Provider::Google => self.google,
            Provider::Facebook => self.facebook,
            Provider::Twitter => self.twitter,
            Provider::LinkedIn => self.linkedin,
            Provider::Microsoft => self.microsoft,
            Provider::Amazon => self.amazon,
        }
    }

    fn set(&mut self, provider: Provider, present: bool) {
        let slot = match provider {
            Provider::Google => &mut self.google,
            Provider::Facebook => &mut self.facebook,
            Provider::Twitter => &mut self.twitter,
            Provider::LinkedIn => &mut self.linkedin,
            Provider::Microsoft => &mut self.microsoft,
            Provider::Amazon => &mut self.amazon,
        };
        *slot = present;
    }

    pub fn count(&self) -> usize {
        let links = Provider::ALL.into_iter().filter(|p| self.has(*p)).count();
        links + usize::from(self.password)
    }
}

type Lookups = (
    StoreResult<Option<Credential>>,
    Vec<(Provider, StoreResult<Option<ExternalLink>>)>,
);

impl<U: UserStore, S: SessionStore, E> AppState<U, S, E> {
    /// One lookup per method, all in flight at once
    async fn lookup_methods(&self, user_id: &UserId) -> Lookups {
        let credential = self.store(
            "credential lookup",
            self.user_store.get_credential_by_user(user_id),
        );
        let links = join_all(Provider::ALL.into_iter().map(|provider| async move {
            let link = self
                .store("link lookup", self.user_store.get_link_for_user(provider, user_id))
                .await;
            (provider, link)
        }));
        join(credential, links).await
    }

    /// Per-method status; a failed lookup is an error
    pub async fn login_methods(&self, user_id: &UserId) -> Result<LoginMethods, BrokerError> {
        let (credential, links) = self.lookup_methods(user_id).await;

        let mut methods = LoginMethods {
            password: credential?.is_some(),
            ..LoginMethods::default()
        };
        for (provider, link) in links {
            methods.set(provider, link?.is_some());
        }
        Ok(methods)
    }

    /// Number of login methods whose lookup found a record
    pub async fn count_active_login_methods(&self, user_id: &UserId) -> usize {
        let (credential, links) = self.lookup_methods(user_id).await;

        let mut count = match credential {
            Ok(found) => usize::from(found.is_some()),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Credential lookup failed");
                0
            }
        };
        for (provider, link) in &links {
            match link {
                Ok(Some(_)) => count += 1,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(user_id = %user_id, provider = %provider, error = %e, "Login method lookup failed")
                }
            }
        }
        count
    }

    /// `CannotRemoveLastLogin` unless the user keeps a method after removing one
    pub(crate) async fn ensure_not_last_login(&self, user_id: &UserId) -> Result<(), BrokerError> {
        if self.count_active_login_methods(user_id).await <= 1 {
            return Err(BrokerError::CannotRemoveLastLogin);
        }
        Ok(())
    }
}
