//! Admin-only endpoints

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::account::AccountResponse;
use super::session::SuccessResponse;
use crate::auth::{Caller, SweepReport};
use crate::email::EmailSender;
use crate::error::BrokerError;
use crate::state::AppState;
use crate::store::{RoleFlags, SessionStore, UserId, UserStore};

#[derive(Deserialize)]
pub struct SetRolesRequest {
    pub roles: RoleFlags,
    pub verified_email: bool,
}

/// POST /admin/users/:user_id/roles
pub async fn set_roles<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    caller: Caller,
    Path(user_id): Path<String>,
    Json(req): Json<SetRolesRequest>,
) -> Result<Json<AccountResponse>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    let user = state
        .set_roles(&caller, &UserId(user_id), req.roles, req.verified_email)
        .await?;
    Ok(Json(user.into()))
}

/// POST /admin/users/:user_id/deactivate
pub async fn deactivate<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> Result<Json<SuccessResponse>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    state.deactivate(&caller, &UserId(user_id)).await?;
    Ok(SuccessResponse::ok())
}

/// POST /admin/sweep/sessions
pub async fn sweep_sessions<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    caller: Caller,
) -> Result<Json<SweepReport>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    state.sweep_sessions(&caller).await.map(Json)
}

/// POST /admin/sweep/login_tokens
pub async fn sweep_login_tokens<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    caller: Caller,
) -> Result<Json<SweepReport>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    state.sweep_login_tokens(&caller).await.map(Json)
}

/// POST /admin/sweep/merge_tokens
pub async fn sweep_merge_tokens<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    caller: Caller,
) -> Result<Json<SweepReport>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    state.sweep_merge_tokens(&caller).await.map(Json)
}

#[derive(Serialize)]
pub struct PurgeResponse {
    pub success: bool,
    pub purged: u64,
}

/// POST /admin/sweep/ephemeral
pub async fn sweep_ephemeral<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    caller: Caller,
) -> Result<Json<PurgeResponse>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    let purged = state.sweep_ephemeral(&caller).await?;
    Ok(Json(PurgeResponse { success: true, purged }))
}
