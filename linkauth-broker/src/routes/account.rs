//! Account endpoints for the signed-in user

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::session::SuccessResponse;
use crate::auth::{Caller, EmailChange, LoginMethods};
use crate::email::EmailSender;
use crate::error::BrokerError;
use crate::state::AppState;
use crate::store::{RoleFlags, SessionStore, User, UserStore};

#[derive(Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub verified_email: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changing_email: Option<String>,
    pub roles: RoleFlags,
    pub newsletter: bool,
}

impl From<User> for AccountResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.0,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            verified_email: user.verified_email,
            changing_email: user.changing_email,
            roles: user.roles,
            newsletter: user.newsletter,
        }
    }
}

/// GET /account
pub async fn me<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    caller: Caller,
) -> Result<Json<AccountResponse>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    let user = state.current_user(&caller).await?;
    Ok(Json(user.into()))
}

/// GET /account/login_methods
pub async fn login_methods<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    caller: Caller,
) -> Result<Json<LoginMethods>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    state.login_methods(&caller.user_id).await.map(Json)
}

#[derive(Deserialize)]
pub struct ChangeEmailRequest {
    pub email: String,
}

#[derive(Serialize)]
pub struct ChangeEmailResponse {
    pub success: bool,
    pub change: EmailChange,
}

/// POST /account/email
pub async fn change_email<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    caller: Caller,
    Json(req): Json<ChangeEmailRequest>,
) -> Result<Json<ChangeEmailResponse>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    let change = state.change_email(&caller, &req.email).await?;
    Ok(Json(ChangeEmailResponse { success: true, change }))
}

/// POST /account/verification
pub async fn resend_verification<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    caller: Caller,
) -> Result<Json<SuccessResponse>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    state.resend_verification(&caller).await?;
    Ok(SuccessResponse::ok())
}

/// POST /account/deactivate
pub async fn deactivate_self<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    caller: Caller,
) -> Result<Json<SuccessResponse>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    state.deactivate(&caller, &caller.user_id).await?;
    Ok(SuccessResponse::ok())
}

/// POST /verifyemail/:id
pub async fn verify_email<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    Path(id): Path<String>,
) -> Result<Json<AccountResponse>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    let user = state.verify_email(&id).await?;
    Ok(Json(user.into()))
}
