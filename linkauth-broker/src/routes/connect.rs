//! Identity-provider flow endpoints

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::extract::Client;
use super::session::{Issued, SuccessResponse};
use crate::auth::{Caller, ConnectionOutcome, PendingProfile, RegistrationConfirmation, StartedConnection};
use crate::email::EmailSender;
use crate::error::BrokerError;
use crate::provider::Provider;
use crate::state::AppState;
use crate::store::{Purpose, SessionStore, UserStore};

#[derive(Deserialize)]
pub struct StartRequest {
    pub purpose: Purpose,
    #[serde(default)]
    pub merge_token: Option<String>,
}

/// POST /auth/:provider/start
pub async fn start<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    Path(provider): Path<String>,
    Json(req): Json<StartRequest>,
) -> Result<Json<StartedConnection>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    let provider: Provider = provider.parse()?;
    state
        .start_connection(provider, req.purpose, req.merge_token)
        .await
        .map(Json)
}

#[derive(Deserialize)]
pub struct CallbackParams {
    pub state: String,
    pub code: String,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum CallbackBody {
    Register { success: bool, profile: PendingProfile },
    Attached { success: bool, provider: Provider },
}

/// GET /auth/:provider/callback?state=..&code=..
pub async fn callback<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    Path(provider): Path<String>,
    caller: Option<Caller>,
    Client(client): Client,
    Query(params): Query<CallbackParams>,
) -> Result<Response, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    let provider: Provider = provider.parse()?;
    let outcome = state
        .complete_connection(provider, &params.state, &params.code, caller.as_ref(), client)
        .await?;

    let response = match outcome {
        ConnectionOutcome::RegisterPending(profile) => Json(CallbackBody::Register {
            success: true,
            profile,
        })
        .into_response(),
        ConnectionOutcome::LoggedIn(tokens) => Issued(tokens).into_response(),
        ConnectionOutcome::Attached(provider) => Json(CallbackBody::Attached {
            success: true,
            provider,
        })
        .into_response(),
    };
    Ok(response)
}

/// POST /auth/:provider/register
pub async fn register<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    Path(provider): Path<String>,
    Client(client): Client,
    Json(req): Json<RegistrationConfirmation>,
) -> Result<Issued, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    let provider: Provider = provider.parse()?;
    state
        .register_with_provider(provider, req, client)
        .await
        .map(Issued)
}

/// DELETE /auth/:provider
pub async fn detach<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    Path(provider): Path<String>,
    caller: Caller,
) -> Result<Json<SuccessResponse>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    let provider: Provider = provider.parse()?;
    state.detach_provider(&caller, provider).await?;
    Ok(SuccessResponse::ok())
}
