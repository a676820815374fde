//! HTTP routes for the broker
//!
//! Handlers are thin: extract, call one `AppState` operation, serialize.

mod account;
mod admin;
mod connect;
mod extract;
mod password;
mod session;
mod well_known;

pub use extract::Client;
pub use session::X_SESSION;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::email::EmailSender;
use crate::state::AppState;
use crate::store::{SessionStore, UserStore};

/// Create the router with all routes
pub fn create_router<U, S, E>(state: Arc<AppState<U, S, E>>) -> Router
where
    U: UserStore + 'static,
    S: SessionStore + 'static,
    E: EmailSender + 'static,
{
    Router::new()
        .route("/.well-known/linkauth", get(well_known::get_signing_key))
        // Provider flows
        .route("/auth/:provider/start", post(connect::start))
        .route("/auth/:provider/callback", get(connect::callback))
        .route("/auth/:provider/register", post(connect::register))
        .route("/auth/:provider", delete(connect::detach))
        // Sessions
        .route("/session/refresh", post(session::refresh))
        .route("/session/logout", post(session::logout))
        .route("/session/logout_others", post(session::logout_others))
        .route("/sessions", get(session::list))
        .route("/sessions/:session_id", delete(session::logout_specific))
        .route("/login_token/redeem", post(session::redeem_login_token))
        // Password login
        .route("/password/register", post(password::register))
        .route("/password/login", post(password::login))
        .route("/password/change", post(password::change))
        .route("/password", post(password::add).delete(password::remove))
        .route("/password/reset", post(password::request_reset))
        .route("/password/reset/confirm", post(password::confirm_reset))
        // Account
        .route("/account", get(account::me))
        .route("/account/login_methods", get(account::login_methods))
        .route("/account/email", post(account::change_email))
        .route("/account/verification", post(account::resend_verification))
        .route("/account/deactivate", post(account::deactivate_self))
        .route("/verifyemail/:id", post(account::verify_email))
        // Admin
        .route("/admin/users/:user_id/roles", post(admin::set_roles))
        .route("/admin/users/:user_id/deactivate", post(admin::deactivate))
        .route("/admin/sweep/sessions", post(admin::sweep_sessions))
        .route("/admin/sweep/login_tokens", post(admin::sweep_login_tokens))
        .route("/admin/sweep/merge_tokens", post(admin::sweep_merge_tokens))
        .route("/admin/sweep/ephemeral", post(admin::sweep_ephemeral))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
