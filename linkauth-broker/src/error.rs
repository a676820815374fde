//! Broker error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::provider::Provider;

/// Failure classes every broker error falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Record absent or already consumed
    NotFound,
    /// TTL exceeded
    Expired,
    /// Already linked, email in use, or last login method
    Conflict,
    /// Missing or invalid caller credential
    Unauthorized,
    /// Authenticated, but not allowed
    Forbidden,
    /// Identity provider, notification, or store deadline failure
    UpstreamFailure,
    /// Malformed input or bad profile data
    Invalid,
    Internal,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Connection not found")]
    ConnectionNotFound,

    #[error("Connection expired")]
    ConnectionExpired,

    #[error("Registration not found")]
    RegistrationNotFound,

    #[error("Registration expired")]
    RegistrationExpired,

    #[error("Identity provider exchange failed for {provider}: {reason}")]
    ProviderExchangeFailed { provider: Provider, reason: String },

    #[error("Identity provider {0} returned an incomplete profile")]
    ProviderProfileIncomplete(Provider),

    #[error("Provider {0} is not configured")]
    ProviderNotConfigured(Provider),

    #[error("External account is already linked")]
    AlreadyLinked,

    #[error("Email already in use")]
    EmailInUse,

    #[error("No account linked to this external identity")]
    NoAccountLinked,

    #[error("Cannot remove the last login method")]
    CannotRemoveLastLogin,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Admin privileges required")]
    Forbidden,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Session expired")]
    SessionExpired,

    #[error("Token expired")]
    TokenExpired,

    #[error("Reset code does not match")]
    InvalidResetCode,

    #[error("Reset code expired")]
    ResetExpired,

    #[error("Verification expired")]
    VerificationExpired,

    #[error("Human verification failed")]
    InvalidHumanVerification,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::ConnectionNotFound
            | BrokerError::RegistrationNotFound
            | BrokerError::NoAccountLinked
            | BrokerError::NotFound(_) => ErrorKind::NotFound,

            BrokerError::ConnectionExpired
            | BrokerError::RegistrationExpired
            | BrokerError::SessionExpired
            | BrokerError::TokenExpired
            | BrokerError::ResetExpired
            | BrokerError::VerificationExpired => ErrorKind::Expired,

            BrokerError::AlreadyLinked
            | BrokerError::EmailInUse
            | BrokerError::CannotRemoveLastLogin => ErrorKind::Conflict,

            BrokerError::Unauthenticated | BrokerError::InvalidCredentials => {
                ErrorKind::Unauthorized
            }

            BrokerError::Forbidden | BrokerError::InvalidResetCode => ErrorKind::Forbidden,

            BrokerError::ProviderExchangeFailed { .. }
            | BrokerError::Timeout(_)
            | BrokerError::Upstream(_) => ErrorKind::UpstreamFailure,

            BrokerError::ProviderProfileIncomplete(_)
            | BrokerError::ProviderNotConfigured(_)
            | BrokerError::InvalidHumanVerification
            | BrokerError::Validation(_) => ErrorKind::Invalid,

            BrokerError::Internal(_) => ErrorKind::Internal,
        }
    }

    fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Expired => StatusCode::GONE,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::UpstreamFailure => StatusCode::BAD_GATEWAY,
            ErrorKind::Invalid => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let reason = match self.kind() {
            ErrorKind::Internal => {
                tracing::error!(error = %self, "Internal error");
                "Internal server error".to_string()
            }
            ErrorKind::UpstreamFailure => {
                tracing::warn!(error = %self, "Upstream failure");
                self.to_string()
            }
            _ => self.to_string(),
        };

        let body = json!({ "success": false, "reason": reason });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy() {
        assert_eq!(BrokerError::ConnectionNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(BrokerError::ConnectionExpired.kind(), ErrorKind::Expired);
        assert_eq!(BrokerError::AlreadyLinked.kind(), ErrorKind::Conflict);
        assert_eq!(BrokerError::CannotRemoveLastLogin.kind(), ErrorKind::Conflict);
        assert_eq!(BrokerError::Unauthenticated.kind(), ErrorKind::Unauthorized);
        assert_eq!(
            BrokerError::ProviderExchangeFailed {
                provider: Provider::Google,
                reason: "boom".into()
            }
            .kind(),
            ErrorKind::UpstreamFailure
        );
        assert_eq!(
            BrokerError::ProviderProfileIncomplete(Provider::Amazon).kind(),
            ErrorKind::Invalid
        );
    }

    #[test]
    fn test_internal_details_not_leaked() {
        let response = BrokerError::Internal("db password is hunter2".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
