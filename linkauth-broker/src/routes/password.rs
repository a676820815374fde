//! Password login endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use super::extract::Client;
use super::session::{Issued, SuccessResponse};
use crate::auth::{Caller, PasswordRegistration};
use crate::email::EmailSender;
use crate::error::BrokerError;
use crate::state::AppState;
use crate::store::{SessionStore, UserId, UserStore};

/// POST /password/register
pub async fn register<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    Client(client): Client,
    Json(req): Json<PasswordRegistration>,
) -> Result<Issued, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    state.register_with_password(req, client).await.map(Issued)
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /password/login
pub async fn login<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    Client(client): Client,
    Json(req): Json<LoginRequest>,
) -> Result<Issued, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    state
        .login_with_password(&req.email, &req.password, client)
        .await
        .map(Issued)
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// POST /password/change
pub async fn change<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    caller: Caller,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<SuccessResponse>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    state
        .change_password(&caller, &req.old_password, &req.new_password)
        .await?;
    Ok(SuccessResponse::ok())
}

#[derive(Deserialize)]
pub struct AddPasswordRequest {
    pub password: String,
}

/// POST /password
pub async fn add<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    caller: Caller,
    Json(req): Json<AddPasswordRequest>,
) -> Result<Json<SuccessResponse>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    state.add_password(&caller, &req.password).await?;
    Ok(SuccessResponse::ok())
}

/// DELETE /password
pub async fn remove<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    caller: Caller,
) -> Result<Json<SuccessResponse>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    state.remove_password(&caller).await?;
    Ok(SuccessResponse::ok())
}

#[derive(Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

/// POST /password/reset
///
/// Always reports success so the response does not reveal whether the email
/// has an account.
pub async fn request_reset<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    Json(req): Json<ResetRequest>,
) -> Result<Json<SuccessResponse>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    state.request_password_reset(&req.email).await?;
    Ok(SuccessResponse::ok())
}

#[derive(Deserialize)]
pub struct ConfirmResetRequest {
    pub user_id: String,
    pub code: String,
    pub password: String,
}

/// POST /password/reset/confirm
pub async fn confirm_reset<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    Json(req): Json<ConfirmResetRequest>,
) -> Result<Json<SuccessResponse>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    state
        .confirm_password_reset(&UserId(req.user_id), &req.code, &req.password)
        .await?;
    Ok(SuccessResponse::ok())
}
