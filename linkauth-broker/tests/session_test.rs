//! Session issuance, refresh, logout and login tokens

mod common;

use chrono::Duration;
use common::{client, Harness};
use linkauth_broker::store::{ClientMetadata, SessionStore, UserStore};
use linkauth_broker::{BrokerError, ErrorKind};

/// Test: a SessionToken issued a second ago refreshes, keeping the session
#[tokio::test]
async fn test_refresh_fresh_session() {
    let h = Harness::new();
    let tokens = h.register_with_password("fresh@example.com", "password123").await;

    h.clock.advance(Duration::seconds(1));
    let refreshed = h.state.refresh(&tokens.session_token, client()).await.unwrap();

    assert_eq!(refreshed.session_id, tokens.session_id);
    assert_eq!(refreshed.user_id, tokens.user_id);
    assert_ne!(refreshed.auth_token, tokens.auth_token);

    let session = h
        .state
        .session_store
        .get_session(&tokens.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.last_used, h.clock_now());
}

/// Test: a SessionToken older than seven days fails Expired
#[tokio::test]
async fn test_refresh_after_seven_days() {
    let h = Harness::new();
    let tokens = h.register_with_password("stale@example.com", "password123").await;

    h.clock.advance(Duration::days(7) + Duration::seconds(1));
    let err = h
        .state
        .refresh(&tokens.session_token, client())
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::SessionExpired));
    assert_eq!(err.kind(), ErrorKind::Expired);
}

/// Test: regular refreshes keep a session alive past seven days
#[tokio::test]
async fn test_refresh_rotation_extends_session() {
    let h = Harness::new();
    let mut tokens = h.register_with_password("rotate@example.com", "password123").await;
    let session_id = tokens.session_id.clone();

    for _ in 0..3 {
        h.clock.advance(Duration::days(6));
        tokens = h.state.refresh(&tokens.session_token, client()).await.unwrap();
    }
    assert_eq!(tokens.session_id, session_id);
}

/// Test: refreshed AuthTokens carry the role flags stored on the session
#[tokio::test]
async fn test_refresh_uses_session_role_snapshot() {
    let h = Harness::new();
    let (admin_id, admin) = h.admin().await;
    assert!(admin.roles.admin);

    // Revoke admin on the user; the existing session keeps its snapshot
    let mut user = h.state.user_store.get_user(&admin_id).await.unwrap().unwrap();
    user.roles.admin = false;
    user.roles.event_author = true;
    h.state.user_store.update_user(&user).await.unwrap();

    let session = h
        .state
        .session_store
        .get_session(&admin.session_id)
        .await
        .unwrap()
        .unwrap();
    let session_token = h
        .state
        .signer
        .sign_session(&session.id.0, Duration::days(7), h.clock_now())
        .unwrap();

    h.clock.advance(Duration::seconds(1));
    let refreshed = h.state.refresh(&session_token, client()).await.unwrap();
    let caller = h.caller(&refreshed);
    assert_eq!(caller.roles, session.roles);
    assert!(caller.roles.admin);
    assert!(!caller.roles.event_author);
}

/// Test: refresh rotates the device metadata
#[tokio::test]
async fn test_refresh_rotates_client_metadata() {
    let h = Harness::new();
    let tokens = h.register_with_password("device@example.com", "password123").await;

    let phone = ClientMetadata {
        ip: "198.51.100.4".to_string(),
        os: "iOS 17.1".to_string(),
        browser: "Safari 17.1".to_string(),
        is_mobile: true,
    };
    h.state.refresh(&tokens.session_token, phone.clone()).await.unwrap();

    let session = h
        .state
        .session_store
        .get_session(&tokens.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.client, phone);
}

/// Test: garbage and AuthTokens are not SessionTokens
#[tokio::test]
async fn test_refresh_rejects_other_tokens() {
    let h = Harness::new();
    let tokens = h.register_with_password("wrong@example.com", "password123").await;

    let err = h.state.refresh("not-a-token", client()).await.unwrap_err();
    assert!(matches!(err, BrokerError::Unauthenticated));

    let err = h.state.refresh(&tokens.auth_token, client()).await.unwrap_err();
    assert!(matches!(err, BrokerError::Unauthenticated));
}

/// Test: logout ends the session; its SessionToken stops working
#[tokio::test]
async fn test_logout() {
    let h = Harness::new();
    let tokens = h.register_with_password("bye@example.com", "password123").await;

    h.state.logout(&h.caller(&tokens)).await.unwrap();

    let err = h.state.refresh(&tokens.session_token, client()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

/// Test: user A cannot end user B's session
#[tokio::test]
async fn test_logout_specific_checks_owner() {
    let h = Harness::new();
    let a = h.register_with_password("a@example.com", "password123").await;
    let b = h.register_with_password("b@example.com", "password123").await;

    let err = h
        .state
        .logout_specific(&h.caller(&a), &b.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::NotFound(_)));

    assert!(h
        .state
        .session_store
        .get_session(&b.session_id)
        .await
        .unwrap()
        .is_some());
    assert!(h.state.refresh(&b.session_token, client()).await.is_ok());
}

/// Test: a user can end another of their own sessions
#[tokio::test]
async fn test_logout_specific_own_session() {
    let h = Harness::new();
    let first = h.register_with_password("multi@example.com", "password123").await;
    let second = h
        .state
        .login_with_password("multi@example.com", "password123", client())
        .await
        .unwrap();

    h.state
        .logout_specific(&h.caller(&first), &second.session_id)
        .await
        .unwrap();

    let overview = h.state.list_sessions(&h.caller(&first)).await.unwrap();
    assert_eq!(overview.current.map(|s| s.id), Some(first.session_id));
    assert!(overview.others.is_empty());
}

/// Test: logout everywhere keeps only the calling session
#[tokio::test]
async fn test_logout_all_except() {
    let h = Harness::new();
    let keep = h.register_with_password("all@example.com", "password123").await;
    for _ in 0..3 {
        h.state
            .login_with_password("all@example.com", "password123", client())
            .await
            .unwrap();
    }

    let ended = h
        .state
        .logout_all_except(&keep.user_id, &keep.session_id)
        .await
        .unwrap();
    assert_eq!(ended, 3);

    let remaining = h.state.session_store.list_sessions(&keep.user_id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, keep.session_id);
}

/// Test: sessions are listed most recently used first
#[tokio::test]
async fn test_list_sessions_order() {
    let h = Harness::new();
    let first = h.register_with_password("list@example.com", "password123").await;
    h.clock.advance(Duration::minutes(4));
    let second = h
        .state
        .login_with_password("list@example.com", "password123", client())
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(4));
    let third = h
        .state
        .login_with_password("list@example.com", "password123", client())
        .await
        .unwrap();

    let overview = h.state.list_sessions(&h.caller(&first)).await.unwrap();
    assert_eq!(overview.current.unwrap().id, first.session_id);
    let others: Vec<_> = overview.others.into_iter().map(|s| s.id).collect();
    assert_eq!(others, vec![third.session_id, second.session_id]);
}

/// Test: a login token logs in once, then is gone
#[tokio::test]
async fn test_login_token_single_use() {
    let h = Harness::new();
    let tokens = h.register_with_password("deferred@example.com", "password123").await;

    let token = h
        .state
        .issue_login_token(&tokens.user_id, Duration::minutes(15))
        .await
        .unwrap();

    let issued = h.state.redeem_login_token(&token, client()).await.unwrap();
    assert_eq!(issued.user_id, tokens.user_id);

    let err = h.state.redeem_login_token(&token, client()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

/// Test: an expired login token fails Expired
#[tokio::test]
async fn test_login_token_expiry() {
    let h = Harness::new();
    let tokens = h.register_with_password("late@example.com", "password123").await;
    let token = h
        .state
        .issue_login_token(&tokens.user_id, Duration::minutes(15))
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(16));
    let err = h.state.redeem_login_token(&token, client()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Expired);
}

/// Test: invalid AuthTokens resolve to an anonymous caller
#[tokio::test]
async fn test_invalid_auth_token_is_anonymous() {
    let h = Harness::new();
    let tokens = h.register_with_password("anon@example.com", "password123").await;

    assert!(h.state.caller_from_token("garbage").is_none());
    assert!(h.state.caller_from_token(&tokens.session_token).is_none());

    h.clock.advance(Duration::minutes(11));
    assert!(h.state.caller_from_token(&tokens.auth_token).is_none());
}
