use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use xword_core::Error;
use xword_core::validation::valid_user_id;

pub const TOKEN_LIFETIME_SECS: u64 = 24 * 60 * 60;
pub const CLOCK_SKEW_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("INVALID_USER")]
    InvalidUser,
    #[error("EXPIRED")]
    Expired,
    #[error("BAD_SIGNATURE")]
    BadSignature,
    #[error("MALFORMED")]
    Malformed,
    #[error("UNAUTHENTICATED")]
    Unauthenticated,
}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Error {
        match e {
            AuthError::InvalidUser => Error::validation("bad user id"),
            other => Error::Unauthenticated(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: u64,
    exp: u64,
}

/// The credential a connection presented at its handshake. Retained for the
/// connection's lifetime so every RPC re-verifies it instead of trusting the
/// handshake forever: a token disabled mid-session fails on the next call.
#[derive(Debug, Clone)]
pub enum Credential {
    Bearer(String),
    Legacy(String),
}

/// Issues and verifies the HS256 bearer tokens gating every stream.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    legacy_allowed: bool,
}

impl TokenService {
    pub fn new(secret: &[u8], legacy_allowed: bool) -> TokenService {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_SECS;
        TokenService {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            legacy_allowed,
        }
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Issue a token for `user_id`. Returns the token and its expiry (unix
    /// seconds).
    pub fn issue_token(&self, user_id: &str) -> Result<(String, u64), AuthError> {
        if !valid_user_id(user_id) {
            return Err(AuthError::InvalidUser);
        }
        let iat = Self::now_secs();
        let exp = iat + TOKEN_LIFETIME_SECS;
        let claims = Claims {
            sub: user_id.to_string(),
            iat,
            exp,
        };
        let token =
            encode(&Header::default(), &claims, &self.encoding).map_err(|_| AuthError::Malformed)?;
        Ok((token, exp))
    }

    pub fn verify_token(&self, raw: &str) -> Result<String, AuthError> {
        decode::<Claims>(raw, &self.decoding, &self.validation)
            .map(|data| data.claims.sub)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::BadSignature,
                _ => AuthError::Malformed,
            })
    }

    /// Resolve exactly one authenticated user id plus the credential it came
    /// from, or fail. Precedence: bearer token, `?token=`, then the legacy
    /// user-id bag (non-production, auth-not-required only).
    pub fn extract_credential(
        &self,
        authorization: Option<&str>,
        query_token: Option<&str>,
        legacy_user: Option<&str>,
    ) -> Result<(String, Credential), AuthError> {
        if let Some(header) = authorization {
            // A present-but-unusable Authorization header never falls through
            // to weaker schemes.
            let token = header.strip_prefix("Bearer ").ok_or(AuthError::Malformed)?;
            let user = self.verify_token(token)?;
            return Ok((user, Credential::Bearer(token.to_string())));
        }
        if let Some(token) = query_token {
            let user = self.verify_token(token)?;
            return Ok((user, Credential::Bearer(token.to_string())));
        }
        if let Some(user) = legacy_user {
            if !self.legacy_allowed {
                return Err(AuthError::Unauthenticated);
            }
            if !valid_user_id(user) {
                return Err(AuthError::InvalidUser);
            }
            return Ok((user.to_string(), Credential::Legacy(user.to_string())));
        }
        Err(AuthError::Unauthenticated)
    }

    pub fn extract_user(
        &self,
        authorization: Option<&str>,
        query_token: Option<&str>,
        legacy_user: Option<&str>,
    ) -> Result<String, AuthError> {
        self.extract_credential(authorization, query_token, legacy_user)
            .map(|(user, _)| user)
    }

    /// Re-check a retained credential. Expiry (and any future revocation)
    /// takes effect on the next RPC, not the next handshake.
    pub fn reverify(&self, credential: &Credential) -> Result<String, AuthError> {
        match credential {
            Credential::Bearer(token) => self.verify_token(token),
            Credential::Legacy(user) => {
                if !self.legacy_allowed {
                    return Err(AuthError::Unauthenticated);
                }
                Ok(user.clone())
            }
        }
    }

    /// Extraction against an HTTP request or a WebSocket handshake: both
    /// carry the same header and query bags.
    pub fn extract_credential_from_request(
        &self,
        headers: &HeaderMap,
        query: &HashMap<String, String>,
        body_user: Option<&str>,
    ) -> Result<(String, Credential), AuthError> {
        let authorization = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let query_token = query.get("token").map(String::as_str);
        let legacy_user = query
            .get("user-id")
            .map(String::as_str)
            .or_else(|| headers.get("x-user-id").and_then(|v| v.to_str().ok()))
            .or(body_user);
        self.extract_credential(authorization, query_token, legacy_user)
    }

    pub fn extract_from_request(
        &self,
        headers: &HeaderMap,
        query: &HashMap<String, String>,
        body_user: Option<&str>,
    ) -> Result<String, AuthError> {
        self.extract_credential_from_request(headers, query, body_user)
            .map(|(user, _)| user)
    }
}
