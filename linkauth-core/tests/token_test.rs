//! Dual-token format tests
//!
//! Exercises the token signer the way an edge service and the broker use it:
//! the broker signs, the edge verifies with nothing but the public key.

use chrono::{Duration, Utc};
use linkauth_core::{Error, KeyPair, RoleFlags, TokenSigner, DEFAULT_ISSUER};

/// Test: a token has three base64url parts separated by dots
#[test]
fn test_token_has_three_parts() {
    let signer = TokenSigner::new(KeyPair::generate(), DEFAULT_ISSUER);
    let token = signer
        .sign_session("ses", Duration::days(7), Utc::now())
        .unwrap();

    let parts: Vec<&str> = token.split('.').collect();
    assert_eq!(parts.len(), 3);
    assert!(parts.iter().all(|p| !p.is_empty() && !p.contains('=')));
}

/// Test: a token signed by a different key is rejected
#[test]
fn test_token_from_other_key_rejected() {
    let ours = TokenSigner::new(KeyPair::generate(), DEFAULT_ISSUER);
    let theirs = TokenSigner::new(KeyPair::generate(), DEFAULT_ISSUER);
    let now = Utc::now();

    let token = theirs
        .sign_auth("u", "s", RoleFlags::default(), Duration::minutes(10), now)
        .unwrap();

    assert!(matches!(
        ours.verify_auth(&token, now),
        Err(Error::SignatureVerificationFailed)
    ));
}

/// Test: garbage input never panics
#[test]
fn test_garbage_rejected() {
    let signer = TokenSigner::new(KeyPair::generate(), DEFAULT_ISSUER);
    let now = Utc::now();

    for input in ["", "a.b", "a.b.c", "...", "not a token at all"] {
        assert!(signer.verify_session(input, now).is_err(), "{input:?}");
        assert!(signer.verify_auth(input, now).is_err(), "{input:?}");
    }
}

/// Test: a SessionToken cannot be used where an AuthToken is expected
#[test]
fn test_session_token_is_not_an_auth_token() {
    let signer = TokenSigner::new(KeyPair::generate(), DEFAULT_ISSUER);
    let now = Utc::now();
    let token = signer.sign_session("ses", Duration::days(7), now).unwrap();

    assert!(signer.verify_auth(&token, now).is_err());
}

/// Test: an AuthToken cannot be traded in as a SessionToken
#[test]
fn test_auth_token_is_not_a_session_token() {
    let signer = TokenSigner::new(KeyPair::generate(), DEFAULT_ISSUER);
    let now = Utc::now();
    let token = signer
        .sign_auth("user", "ses", RoleFlags::default(), Duration::minutes(10), now)
        .unwrap();

    assert!(signer.verify_session(&token, now).is_err());
}

/// Test: a token issued one second ago is still valid at the end of its TTL window
#[test]
fn test_expiry_boundary() {
    let signer = TokenSigner::new(KeyPair::generate(), DEFAULT_ISSUER);
    let issued = Utc::now();
    let token = signer.sign_session("ses", Duration::days(7), issued).unwrap();

    assert!(signer
        .verify_session(&token, issued + Duration::seconds(1))
        .is_ok());
    assert!(signer
        .verify_session(&token, issued + Duration::days(7) - Duration::seconds(1))
        .is_ok());
    assert!(matches!(
        signer.verify_session(&token, issued + Duration::days(7)),
        Err(Error::TokenExpired)
    ));
}

/// Test: the published public key alone is enough to check a signature
#[test]
fn test_public_key_verifies_signature() {
    let key = KeyPair::generate();
    let public = key.public_key();
    let signer = TokenSigner::new(key, DEFAULT_ISSUER);
    let token = signer
        .sign_session("ses", Duration::days(7), Utc::now())
        .unwrap();

    let parts: Vec<&str> = token.rsplitn(2, '.').collect();
    let sig = base64_decode(parts[0]);
    public.verify(parts[1].as_bytes(), &sig).unwrap();
}

fn base64_decode(s: &str) -> Vec<u8> {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    URL_SAFE_NO_PAD.decode(s).unwrap()
}
