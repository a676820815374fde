//! Batched expiry sweeps

mod common;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::{FlakySessionStore, Harness, MockEmailSender};
use linkauth_broker::auth::Caller;
use linkauth_broker::store::{
    ClientMetadata, PendingConnection, Purpose, RoleFlags, Session, SessionId, SessionStore, UserId,
    UserStore,
};
use linkauth_broker::{AppState, BrokerError, Clock, InMemoryUserStore, ManualClock, Provider};
use linkauth_core::{KeyPair, TokenSigner};

fn admin_caller() -> Caller {
    Caller {
        user_id: UserId("admin".into()),
        session_id: SessionId("admin-session".into()),
        token_id: "t".into(),
        roles: RoleFlags {
            admin: true,
            ..RoleFlags::default()
        },
    }
}

fn session(user: &str, last_used: DateTime<Utc>) -> Session {
    Session {
        id: SessionId::generate(),
        user_id: UserId(user.to_string()),
        last_used,
        client: ClientMetadata::default(),
        roles: RoleFlags::default(),
    }
}

/// Test: 1200 expired sessions go in batches of 500/500/200; a failure in
/// batch 2 does not stop batch 3 and is reported
#[tokio::test]
async fn test_session_sweep_continues_past_failed_batch() {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(FlakySessionStore::failing_on(2));
    let now = clock.now();

    for i in 0..1200 {
        store
            .create_session(session(&format!("u{}", i % 7), now - Duration::days(8)))
            .await
            .unwrap();
    }
    let live = session("active", now - Duration::hours(1));
    store.create_session(live.clone()).await.unwrap();

    let state = AppState::with_shared_stores(
        TokenSigner::new(KeyPair::generate(), "sweep-test"),
        Arc::new(InMemoryUserStore::new()),
        store.clone(),
        MockEmailSender::new(),
    )
    .with_clock(clock);

    let result = state.sweep_sessions(&admin_caller()).await;
    assert!(matches!(result, Err(BrokerError::Internal(msg)) if msg == FlakySessionStore::FAILURE));
    assert_eq!(store.batches(), vec![500, 500, 200]);

    // Batches 1 and 3 were deleted, batch 2 remains
    let remaining = store
        .sessions_used_before(now - Duration::days(7))
        .await
        .unwrap();
    assert_eq!(remaining.len(), 500);
    assert!(store.get_session(&live.id).await.unwrap().is_some());
}

/// Test: a clean sweep reports every deletion
#[tokio::test]
async fn test_session_sweep_report() {
    let h = Harness::new();
    let (_, admin) = h.admin().await;
    let now = h.clock_now();

    for _ in 0..3 {
        h.state
            .session_store
            .create_session(session("idle", now - Duration::days(10)))
            .await
            .unwrap();
    }

    let report = h.state.sweep_sessions(&admin).await.unwrap();
    assert_eq!(report.matched, 3);
    assert_eq!(report.deleted, 3);
    assert_eq!(report.failed_batches, 0);

    // The admin's own session is fresh and survives
    assert!(h.state.list_sessions(&admin).await.unwrap().current.is_some());
}

/// Test: sweeps are admin-only
#[tokio::test]
async fn test_sweep_requires_admin() {
    let h = Harness::new();
    let tokens = h.register_with_password("user@example.com", "password123").await;
    let caller = h.caller(&tokens);

    assert!(matches!(h.state.sweep_sessions(&caller).await, Err(BrokerError::Forbidden)));
    assert!(matches!(h.state.sweep_login_tokens(&caller).await, Err(BrokerError::Forbidden)));
    assert!(matches!(h.state.sweep_merge_tokens(&caller).await, Err(BrokerError::Forbidden)));
    assert!(matches!(h.state.sweep_ephemeral(&caller).await, Err(BrokerError::Forbidden)));
}

/// Test: expired login and merge tokens are swept, live ones kept
#[tokio::test]
async fn test_token_sweeps() {
    let h = Harness::new();
    let (admin_id, admin) = h.admin().await;

    let old_login = h.state.issue_login_token(&admin_id, Duration::minutes(5)).await.unwrap();
    let old_merge = h.state.issue_merge_token(&admin_id, Duration::minutes(5)).await.unwrap();
    h.clock.advance(Duration::minutes(6));
    let new_merge = h.state.issue_merge_token(&admin_id, Duration::hours(1)).await.unwrap();

    let logins = h.state.sweep_login_tokens(&admin).await.unwrap();
    assert_eq!(logins.deleted, 1);
    let merges = h.state.sweep_merge_tokens(&admin).await.unwrap();
    assert_eq!(merges.deleted, 1);

    assert!(h.state.session_store.take_login_token(&old_login).await.unwrap().is_none());
    assert!(h.state.session_store.get_merge_token(&old_merge).await.unwrap().is_none());
    assert!(h.state.session_store.get_merge_token(&new_merge).await.unwrap().is_some());
}

/// Test: stale pending connections are purged
#[tokio::test]
async fn test_ephemeral_sweep() {
    let h = Harness::new();
    let (_, admin) = h.admin().await;
    let now = h.clock_now();

    h.state
        .user_store
        .create_connection(PendingConnection {
            state: "stale".into(),
            provider: Provider::Google,
            purpose: Purpose::Login,
            merge_token: None,
            created_at: now - Duration::hours(2),
        })
        .await
        .unwrap();
    h.state
        .start_connection(Provider::Google, Purpose::Login, None)
        .await
        .unwrap();

    let purged = h.state.sweep_ephemeral(&admin).await.unwrap();
    assert!(purged >= 1);
    assert_eq!(h.state.user_store.pending_connections(), 1);
}
