//! /.well-known/linkauth endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::email::EmailSender;
use crate::state::AppState;
use crate::store::{SessionStore, UserStore};

/// What a relying service needs to verify AuthTokens on its own
#[derive(Serialize)]
pub struct SigningKeyDocument {
    pub issuer: String,
    pub alg: &'static str,
    /// Base64 Ed25519 public key
    pub public_key: String,
}

/// GET /.well-known/linkauth
pub async fn get_signing_key<U, S, E>(
    State(state): State<Arc<AppState<U, S, E>>>,
) -> Json<SigningKeyDocument>
where
    U: UserStore,
    S: SessionStore,
    E: EmailSender,
{
    Json(SigningKeyDocument {
        issuer: state.signer.issuer().to_string(),
        alg: "EdDSA",
        public_key: state.signer.public_key().to_base64(),
    })
}
