//! Account maintenance: email verification, email change, roles and deactivation

use futures::future::join_all;
use serde::Serialize;

use super::{verification_ttl, Caller};
use crate::crypto::{generate_secret, is_disposable_email, is_valid_email};
use crate::email::{EmailSender, OutboundEmail};
use crate::error::BrokerError;
use crate::provider::Provider;
use crate::state::AppState;
use crate::store::{EmailVerification, RoleFlags, SessionStore, User, UserId, UserStore};

/// What `change_email` did with the new address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailChange {
    /// Held in `changing_email` until verified
    Staged,
    /// Became the primary email immediately
    Switched,
}

fn display_name(user: &User) -> String {
    format!("{} {}", user.first_name, user.last_name).trim().to_string()
}

impl<U: UserStore, S: SessionStore, E: EmailSender> AppState<U, S, E> {
    pub async fn current_user(&self, caller: &Caller) -> Result<User, BrokerError> {
        self.load_user(&caller.user_id).await
    }

    async fn load_user(&self, user_id: &UserId) -> Result<User, BrokerError> {
        self.store("user lookup", self.user_store.get_user(user_id))
            .await?
            .ok_or(BrokerError::NotFound("user"))
    }

    /// Store a fresh verification record for `email`, replacing any live one,
    /// and mail its link
    pub(crate) async fn send_verification(&self, user: &User, email: &str) -> Result<(), BrokerError> {
        let verification = EmailVerification {
            id: generate_secret(),
            user_id: user.id.clone(),
            email: email.to_string(),
            expires_at: self.clock.now() + verification_ttl(),
        };
        let mail = OutboundEmail::verification(&self.site_url, &display_name(user), email, &verification.id);

        self.store(
            "verification create",
            self.user_store.put_email_verification(verification),
        )
        .await?;
        self.notify(&mail)
    }

    /// Redeem a verification link
    pub async fn verify_email(&self, id: &str) -> Result<User, BrokerError> {
        let record = self
            .store("verification take", self.user_store.take_email_verification(id))
            .await?
            .ok_or(BrokerError::NotFound("verification"))?;

        if record.expires_at < self.clock.now() {
            return Err(BrokerError::VerificationExpired);
        }

        let mut user = self.load_user(&record.user_id).await?;
        let staged = user
            .changing_email
            .as_deref()
            .is_some_and(|e| e.eq_ignore_ascii_case(&record.email));

        if !user.verified_email && user.email.eq_ignore_ascii_case(&record.email) {
            user.verified_email = true;
            user.changing_email = None;
        } else if user.verified_email && staged {
            if let Some(mut credential) = self
                .store("credential lookup", self.user_store.get_credential_by_user(&user.id))
                .await?
            {
                credential.email = record.email.to_lowercase();
                self.store("credential update", self.user_store.update_credential(&credential))
                    .await?;
            }
            user.email = record.email.clone();
            user.changing_email = None;
        } else {
            return Err(BrokerError::NotFound("verification"));
        }

        self.store("user update", self.user_store.update_user(&user)).await?;
        tracing::info!(user_id = %user.id, email = %user.email, "Email verified");
        Ok(user)
    }

    /// Send a new verification link for whatever address still needs one
    pub async fn resend_verification(&self, caller: &Caller) -> Result<(), BrokerError> {
        let user = self.current_user(caller).await?;
        let target = if !user.verified_email {
            user.email.clone()
        } else {
            user.changing_email
                .clone()
                .ok_or(BrokerError::NotFound("pending verification"))?
        };
        self.send_verification(&user, &target).await
    }

    pub async fn change_email(&self, caller: &Caller, new_email: &str) -> Result<EmailChange, BrokerError> {
        let new_email = new_email.trim();
        if !is_valid_email(new_email) {
            return Err(BrokerError::Validation("invalid email address".into()));
        }
        if is_disposable_email(new_email) {
            return Err(BrokerError::Validation("disposable email addresses are not accepted".into()));
        }

        let taken_by_user = self
            .store("user lookup", self.user_store.get_user_by_email(new_email))
            .await?
            .is_some();
        let taken_by_credential = self
            .store("credential lookup", self.user_store.get_credential_by_email(new_email))
            .await?
            .is_some_and(|c| c.user_id != caller.user_id);
        if taken_by_user || taken_by_credential {
            return Err(BrokerError::EmailInUse);
        }

        let mut user = self.current_user(caller).await?;
        let change = if user.verified_email {
            user.changing_email = Some(new_email.to_string());
            EmailChange::Staged
        } else {
            if let Some(mut credential) = self
                .store("credential lookup", self.user_store.get_credential_by_user(&user.id))
                .await?
            {
                credential.email = new_email.to_lowercase();
                self.store("credential update", self.user_store.update_credential(&credential))
                    .await?;
            }
            user.email = new_email.to_string();
            EmailChange::Switched
        };

        self.store("user update", self.user_store.update_user(&user)).await?;
        self.send_verification(&user, new_email).await?;

        tracing::info!(user_id = %user.id, change = ?change, "Email change requested");
        Ok(change)
    }

    /// Admin-only role and verification override
    pub async fn set_roles(
        &self,
        caller: &Caller,
        user_id: &UserId,
        roles: RoleFlags,
        verified_email: bool,
    ) -> Result<User, BrokerError> {
        caller.require_admin()?;

        let mut user = self.load_user(user_id).await?;
        user.roles = roles;
        user.verified_email = verified_email;
        self.store("user update", self.user_store.update_user(&user)).await?;

        tracing::info!(admin = %caller.user_id, user_id = %user.id, roles = ?roles, "Roles updated");
        Ok(user)
    }

    /// Remove every login method of `target` and end all its sessions
    pub async fn deactivate(&self, caller: &Caller, target: &UserId) -> Result<(), BrokerError> {
        if caller.user_id != *target && !caller.roles.admin {
            return Err(BrokerError::Forbidden);
        }
        let user = self.load_user(target).await?;

        self.store("credential delete", self.user_store.delete_credential(target))
            .await?;
        let unlinked = join_all(
            Provider::ALL
                .into_iter()
                .map(|provider| self.store("link delete", self.user_store.delete_link(provider, target))),
        )
        .await;
        for result in unlinked {
            result?;
        }

        self.logout_all(target).await?;
        self.notify(&OutboundEmail::deactivated(&display_name(&user), &user.email))?;

        tracing::info!(by = %caller.user_id, user_id = %target, "Account deactivated");
        Ok(())
    }
}
