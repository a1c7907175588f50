use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{HeaderMap, HeaderValue};
use serde::Serialize;

use xword_server::auth::{AuthError, Credential, TokenService, TOKEN_LIFETIME_SECS};

const SECRET: &[u8] = b"a-test-secret-that-is-long-enough!!";

fn service(legacy: bool) -> TokenService {
    TokenService::new(SECRET, legacy)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[derive(Serialize)]
struct RawClaims {
    sub: String,
    iat: u64,
    exp: u64,
}

fn forge(secret: &[u8], sub: &str, iat: u64, exp: u64) -> String {
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &RawClaims {
            sub: sub.into(),
            iat,
            exp,
        },
        &jsonwebtoken::EncodingKey::from_secret(secret),
    )
    .unwrap()
}

#[test]
fn issue_and_verify_roundtrip() {
    let svc = service(false);
    let (token, expires_at) = svc.issue_token("alice").unwrap();
    assert!(expires_at >= now_secs() + TOKEN_LIFETIME_SECS - 5);
    assert_eq!(svc.verify_token(&token).unwrap(), "alice");
}

#[test]
fn invalid_user_ids_are_refused_at_issuance() {
    let svc = service(false);
    assert_eq!(svc.issue_token("").unwrap_err(), AuthError::InvalidUser);
    assert_eq!(
        svc.issue_token(&"x".repeat(129)).unwrap_err(),
        AuthError::InvalidUser
    );
    assert_eq!(
        svc.issue_token("ctrl\u{0007}char").unwrap_err(),
        AuthError::InvalidUser
    );
}

#[test]
fn expired_token_rejected() {
    let svc = service(false);
    // Expired an hour ago, far outside the 30s leeway.
    let token = forge(SECRET, "alice", now_secs() - 7200, now_secs() - 3600);
    assert_eq!(svc.verify_token(&token).unwrap_err(), AuthError::Expired);
}

#[test]
fn wrong_secret_rejected_as_bad_signature() {
    let svc = service(false);
    let token = forge(
        b"a-different-secret-also-long-enough",
        "alice",
        now_secs(),
        now_secs() + 3600,
    );
    assert_eq!(
        svc.verify_token(&token).unwrap_err(),
        AuthError::BadSignature
    );
}

#[test]
fn garbage_rejected_as_malformed() {
    let svc = service(false);
    assert_eq!(
        svc.verify_token("not.a.token").unwrap_err(),
        AuthError::Malformed
    );
    assert_eq!(svc.verify_token("").unwrap_err(), AuthError::Malformed);
}

#[test]
fn bearer_header_takes_precedence_over_query_token() {
    let svc = service(false);
    let (good, _) = svc.issue_token("header-user").unwrap();
    let (other, _) = svc.issue_token("query-user").unwrap();

    let user = svc
        .extract_user(Some(&format!("Bearer {good}")), Some(&other), None)
        .unwrap();
    assert_eq!(user, "header-user");
}

#[test]
fn non_bearer_authorization_never_falls_through() {
    let svc = service(true);
    let err = svc
        .extract_user(Some("Basic dXNlcjpwdw=="), None, Some("legacy-user"))
        .unwrap_err();
    assert_eq!(err, AuthError::Malformed);
}

#[test]
fn legacy_user_id_only_honored_when_enabled() {
    let enabled = service(true);
    assert_eq!(
        enabled.extract_user(None, None, Some("dev-user")).unwrap(),
        "dev-user"
    );

    let disabled = service(false);
    assert_eq!(
        disabled
            .extract_user(None, None, Some("dev-user"))
            .unwrap_err(),
        AuthError::Unauthenticated
    );
}

#[test]
fn no_credentials_is_unauthenticated() {
    let svc = service(true);
    assert_eq!(
        svc.extract_user(None, None, None).unwrap_err(),
        AuthError::Unauthenticated
    );
}

#[test]
fn reverify_rejects_a_token_that_expired_mid_session() {
    let svc = service(false);
    let (token, _) = svc.issue_token("alice").unwrap();
    let (user, credential) = svc
        .extract_credential(Some(&format!("Bearer {token}")), None, None)
        .unwrap();
    assert_eq!(user, "alice");
    // Still valid: re-verification succeeds like the handshake did.
    assert_eq!(svc.reverify(&credential).unwrap(), "alice");

    // A credential whose token has since expired fails on re-verification.
    let dead = Credential::Bearer(forge(SECRET, "alice", now_secs() - 7200, now_secs() - 3600));
    assert_eq!(svc.reverify(&dead).unwrap_err(), AuthError::Expired);
}

#[test]
fn reverify_legacy_follows_the_bypass_gate() {
    let enabled = service(true);
    let credential = Credential::Legacy("dev-user".to_string());
    assert_eq!(enabled.reverify(&credential).unwrap(), "dev-user");

    let disabled = service(false);
    assert_eq!(
        disabled.reverify(&credential).unwrap_err(),
        AuthError::Unauthenticated
    );
}

#[test]
fn request_extraction_reads_header_query_and_legacy_bags() {
    let svc = service(true);
    let (token, _) = svc.issue_token("alice").unwrap();

    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    let user = svc
        .extract_from_request(&headers, &HashMap::new(), None)
        .unwrap();
    assert_eq!(user, "alice");

    let mut query = HashMap::new();
    query.insert("token".to_string(), token.clone());
    let user = svc
        .extract_from_request(&HeaderMap::new(), &query, None)
        .unwrap();
    assert_eq!(user, "alice");

    let mut headers = HeaderMap::new();
    headers.insert("x-user-id", HeaderValue::from_static("legacy-header-user"));
    let user = svc
        .extract_from_request(&headers, &HashMap::new(), None)
        .unwrap();
    assert_eq!(user, "legacy-header-user");
}
