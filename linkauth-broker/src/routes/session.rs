//! Session endpoints and the token response headers

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::extract::Client;
use crate::auth::{Caller, SessionOverview, SessionTokens};
use crate::email::EmailSender;
use crate::error::BrokerError;
use crate::state::AppState;
use crate::store::{SessionId, SessionStore, UserStore};

/// Header carrying the SessionToken, both ways
pub const X_SESSION: &str = "x-session";

#[derive(Serialize)]
struct IssuedBody<'a> {
    success: bool,
    user_id: &'a str,
    session_id: &'a str,
    session_token: &'a str,
    auth_token: &'a str,
}

/// A freshly issued token pair: sets `X-Session` and `Authorization`
pub struct Issued(pub SessionTokens);

impl IntoResponse for Issued {
    fn into_response(self) -> Response {
        let tokens = self.0;
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&tokens.session_token) {
            headers.insert(X_SESSION, value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", tokens.auth_token)) {
            headers.insert(header::AUTHORIZATION, value);
        }

        let body = IssuedBody {
            success: true,
            user_id: &tokens.user_id.0,
            session_id: &tokens.session_id.0,
            session_token: &tokens.session_token,
            auth_token: &tokens.auth_token,
        };
        (headers, Json(body)).into_response()
    }
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

/// POST /session/refresh
pub async fn refresh<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    Client(client): Client,
    headers: HeaderMap,
) -> Result<Issued, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    let token = headers
        .get(X_SESSION)
        .and_then(|v| v.to_str().ok())
        .ok_or(BrokerError::Unauthenticated)?;

    state.refresh(token, client).await.map(Issued)
}

/// POST /session/logout
pub async fn logout<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    caller: Caller,
) -> Result<Json<SuccessResponse>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    state.logout(&caller).await?;
    Ok(SuccessResponse::ok())
}

#[derive(Serialize)]
pub struct LogoutOthersResponse {
    pub success: bool,
    pub ended: u64,
}

/// POST /session/logout_others
pub async fn logout_others<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    caller: Caller,
) -> Result<Json<LogoutOthersResponse>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    let ended = state
        .logout_all_except(&caller.user_id, &caller.session_id)
        .await?;
    Ok(Json(LogoutOthersResponse { success: true, ended }))
}

/// DELETE /sessions/:session_id
pub async fn logout_specific<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    caller: Caller,
    Path(session_id): Path<String>,
) -> Result<Json<SuccessResponse>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    state
        .logout_specific(&caller, &SessionId(session_id))
        .await?;
    Ok(SuccessResponse::ok())
}

/// GET /sessions
pub async fn list<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    caller: Caller,
) -> Result<Json<SessionOverview>, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    state.list_sessions(&caller).await.map(Json)
}

#[derive(Deserialize)]
pub struct RedeemRequest {
    pub token: String,
}

/// POST /login_token/redeem
pub async fn redeem_login_token<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
    Client(client): Client,
    Json(req): Json<RedeemRequest>,
) -> Result<Issued, BrokerError>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    state.redeem_login_token(&req.token, client).await.map(Issued)
}
