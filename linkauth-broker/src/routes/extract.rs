//! Request extractors shared by all handlers

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header;
use axum::http::request::Parts;

use crate::auth::Caller;
use crate::error::BrokerError;
use crate::state::AppState;
use crate::store::ClientMetadata;

/// An authenticated caller; rejects with 401 when the AuthToken is missing or
/// invalid. Use `Option<Caller>` where anonymous access is allowed.
#[async_trait]
impl<U, S, E> FromRequestParts<Arc<AppState<U, S, E>>> for Caller
where
    U: Send + Sync + 'static,
    S: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    type Rejection = BrokerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<U, S, E>>,
    ) -> Result<Self, Self::Rejection> {
        state
            .caller_from_headers(&parts.headers)
            .ok_or(BrokerError::Unauthenticated)
    }
}

/// Device metadata of the requesting client
#[derive(Debug, Clone)]
pub struct Client(pub ClientMetadata);

#[async_trait]
impl<U, S, E> FromRequestParts<Arc<AppState<U, S, E>>> for Client
where
    U: Send + Sync + 'static,
    S: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<U, S, E>>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let forwarded_for = parts
            .headers
            .get("x-forwarded-for")
            .filter(|_| state.trust_proxy)
            .and_then(|v| v.to_str().ok());
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        Ok(Client(ClientMetadata::from_request(peer, forwarded_for, user_agent)))
    }
}
