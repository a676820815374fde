//! Credential (password) management

use serde::Deserialize;

use super::{reset_ttl, Caller, SessionTokens};
use crate::crypto::{generate_secret, hash_password, is_disposable_email, is_valid_email, verify_password};
use crate::email::{EmailSender, OutboundEmail};
use crate::error::BrokerError;
use crate::state::AppState;
use crate::store::{ClientMetadata, Credential, PasswordReset, RoleFlags, SessionStore, User, UserId, UserStore};

/// Minimum password length
const MIN_PASSWORD_LENGTH: usize = 8;
/// Maximum password length in bytes; bcrypt ignores anything past 72
const MAX_PASSWORD_LENGTH: usize = 72;

/// Sign-up with email and password
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordRegistration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    /// Human-verification response token
    pub human_verification: String,
    #[serde(default)]
    pub newsletter: bool,
}

fn check_length(password: &str) -> Result<(), BrokerError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(BrokerError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(BrokerError::Validation(format!(
            "password must be at most {} bytes",
            MAX_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

fn hash(password: &str) -> Result<String, BrokerError> {
    hash_password(password).map_err(|e| BrokerError::Internal(format!("password hashing failed: {}", e)))
}

impl<U: UserStore, S: SessionStore, E: EmailSender> AppState<U, S, E> {
    pub async fn register_with_password(
        &self,
        registration: PasswordRegistration,
        client: ClientMetadata,
    ) -> Result<SessionTokens, BrokerError> {
        let email = registration.email.trim().to_string();
        if !is_valid_email(&email) {
            return Err(BrokerError::Validation("invalid email address".into()));
        }
        if is_disposable_email(&email) {
            return Err(BrokerError::Validation("disposable email addresses are not accepted".into()));
        }
        check_length(&registration.password)?;

        let user_exists = self
            .store("user lookup", self.user_store.get_user_by_email(&email))
            .await?
            .is_some();
        let credential_exists = self
            .store("credential lookup", self.user_store.get_credential_by_email(&email))
            .await?
            .is_some();
        if user_exists || credential_exists {
            return Err(BrokerError::EmailInUse);
        }

        self.human_verifier
            .verify(&registration.human_verification, &client.ip)
            .await?;

        let password_hash = hash(&registration.password)?;
        let user = User {
            id: UserId::generate(),
            email: email.clone(),
            first_name: registration.first_name,
            last_name: registration.last_name,
            verified_email: false,
            changing_email: None,
            roles: RoleFlags::default(),
            newsletter: registration.newsletter,
            created_at: self.clock.now(),
        };
        self.store("user create", self.user_store.create_user(user.clone()))
            .await?;
        self.store(
            "credential create",
            self.user_store.create_credential(Credential {
                email: email.to_lowercase(),
                password_hash,
                user_id: user.id.clone(),
            }),
        )
        .await?;
        self.send_verification(&user, &email).await?;

        tracing::info!(user_id = %user.id, "User registered with password");
        self.login(&user, client).await
    }

    pub async fn login_with_password(
        &self,
        email: &str,
        password: &str,
        client: ClientMetadata,
    ) -> Result<SessionTokens, BrokerError> {
        let credential = self
            .store(
                "credential lookup",
                self.user_store.get_credential_by_email(&email.trim().to_lowercase()),
            )
            .await?
            .ok_or(BrokerError::InvalidCredentials)?;

        let matches = verify_password(password, &credential.password_hash)
            .map_err(|e| BrokerError::Internal(format!("password verification failed: {}", e)))?;
        if !matches {
            tracing::debug!(user_id = %credential.user_id, "Password mismatch");
            return Err(BrokerError::InvalidCredentials);
        }

        let user = self
            .store("user lookup", self.user_store.get_user(&credential.user_id))
            .await?
            .ok_or(BrokerError::InvalidCredentials)?;
        self.login(&user, client).await
    }

    /// Replace the caller's password and end every other session
    pub async fn change_password(&self, caller: &Caller, old_password: &str, new_password: &str) -> Result<(), BrokerError> {
        check_length(new_password)?;

        let mut credential = self
            .store("credential lookup", self.user_store.get_credential_by_user(&caller.user_id))
            .await?
            .ok_or(BrokerError::NotFound("password login"))?;

        let matches = verify_password(old_password, &credential.password_hash)
            .map_err(|e| BrokerError::Internal(format!("password verification failed: {}", e)))?;
        if !matches {
            return Err(BrokerError::InvalidCredentials);
        }

        credential.password_hash = hash(new_password)?;
        self.store("credential update", self.user_store.update_credential(&credential))
            .await?;

        self.logout_all_except(&caller.user_id, &caller.session_id).await?;

        tracing::info!(user_id = %caller.user_id, "Password changed");
        Ok(())
    }

    /// Give a provider-only account a password login on its primary email
    pub async fn add_password(&self, caller: &Caller, password: &str) -> Result<(), BrokerError> {
        check_length(password)?;

        if self
            .store("credential lookup", self.user_store.get_credential_by_user(&caller.user_id))
            .await?
            .is_some()
        {
            return Err(BrokerError::Validation("a password login already exists".into()));
        }

        let user = self.current_user(caller).await?;
        let credential = Credential {
            email: user.email.to_lowercase(),
            password_hash: hash(password)?,
            user_id: user.id,
        };
        self.store("credential create", self.user_store.create_credential(credential))
            .await
    }

    /// Drop the caller's password login, keeping at least one login method
    pub async fn remove_password(&self, caller: &Caller) -> Result<(), BrokerError> {
        self.ensure_not_last_login(&caller.user_id).await?;

        let removed = self
            .store("credential delete", self.user_store.delete_credential(&caller.user_id))
            .await?;
        if !removed {
            return Err(BrokerError::NotFound("password login"));
        }

        tracing::info!(user_id = %caller.user_id, "Password login removed");
        Ok(())
    }

    /// Mail a reset link. Succeeds silently for unknown addresses.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), BrokerError> {
        let Some(user) = self
            .store("user lookup", self.user_store.get_user_by_email(email.trim()))
            .await?
        else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let now = self.clock.now();
        let reset = match self
            .store("reset lookup", self.user_store.get_password_reset(&user.id))
            .await?
        {
            Some(existing) if existing.expires_at > now => existing,
            _ => {
                let reset = PasswordReset {
                    id: generate_secret(),
                    user_id: user.id.clone(),
                    expires_at: now + reset_ttl(),
                };
                self.store("reset create", self.user_store.put_password_reset(reset.clone()))
                    .await?;
                reset
            }
        };

        let name = format!("{} {}", user.first_name, user.last_name);
        self.notify(&OutboundEmail::password_reset(
            &self.site_url,
            name.trim(),
            &user.email,
            &reset.id,
            &user.id.0,
        ))
    }

    /// Set a new password from a reset link and end every session of the user
    pub async fn confirm_password_reset(
        &self,
        user_id: &UserId,
        code: &str,
        new_password: &str,
    ) -> Result<(), BrokerError> {
        check_length(new_password)?;

        let reset = self
            .store("reset lookup", self.user_store.get_password_reset(user_id))
            .await?
            .ok_or(BrokerError::NotFound("password reset"))?;

        if reset.expires_at < self.clock.now() {
            if let Err(e) = self
                .store("reset delete", self.user_store.take_password_reset(user_id))
                .await
            {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to delete expired reset");
            }
            return Err(BrokerError::ResetExpired);
        }
        if reset.id != code {
            return Err(BrokerError::InvalidResetCode);
        }

        self.store("reset take", self.user_store.take_password_reset(user_id))
            .await?
            .filter(|r| r.id == code)
            .ok_or(BrokerError::NotFound("password reset"))?;

        let password_hash = hash(new_password)?;
        match self
            .store("credential lookup", self.user_store.get_credential_by_user(user_id))
            .await?
        {
            Some(mut credential) => {
                credential.password_hash = password_hash;
                self.store("credential update", self.user_store.update_credential(&credential))
                    .await?;
            }
            None => {
                let user = self
                    .store("user lookup", self.user_store.get_user(user_id))
                    .await?
                    .ok_or(BrokerError::NotFound("user"))?;
                let credential = Credential {
                    email: user.email.to_lowercase(),
                    password_hash,
                    user_id: user.id,
                };
                self.store("credential create", self.user_store.create_credential(credential))
                    .await?;
            }
        }

        self.logout_all(user_id).await?;
        tracing::info!(user_id = %user_id, "Password reset");
        Ok(())
    }
}
