//! HS256 token issuance and verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use thiserror::Error;

use stockflow_core::UserId;

use crate::{JwtClaims, Role, TokenValidationError, validate_claims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signature is invalid")]
    BadSignature,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Verifies a bearer token and returns its claims.
///
/// `now` is passed in so expiry checks are deterministic under test.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError>;
}

/// Shared-secret HS256 validator.
///
/// The secret is read-only after construction; one instance is shared by all
/// concurrent requests.
#[derive(Clone)]
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time window is checked by `validate_claims` against the caller's clock.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "exp", "iat"]);

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed(e.to_string()),
            })?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

/// A freshly signed token.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs tokens the gate can verify (same secret, same algorithm).
#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(
        &self,
        user_id: UserId,
        username: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        // Whole seconds, so the signed claims round-trip exactly.
        let issued_at = DateTime::<Utc>::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        let claims = JwtClaims {
            sub: user_id,
            username: username.to_string(),
            role,
            issued_at,
            expires_at: issued_at + self.ttl,
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            token,
            expires_at: claims.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(SECRET, Duration::hours(1))
    }

    #[test]
    fn issued_token_verifies_with_same_secret() {
        let now = Utc::now();
        let user = UserId::new();
        let issued = issuer().issue(user, "alice", Role::Admin, now).unwrap();

        let claims = Hs256JwtValidator::new(SECRET)
            .validate(&issued.token, now)
            .unwrap();

        assert_eq!(claims.sub, user);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.expires_at, issued.expires_at);
    }

    #[test]
    fn other_secret_is_bad_signature() {
        let now = Utc::now();
        let issued = issuer().issue(UserId::new(), "alice", Role::User, now).unwrap();

        let err = Hs256JwtValidator::new(b"another-secret-another-secret-xx")
            .validate(&issued.token, now)
            .unwrap_err();

        assert_eq!(err, TokenError::BadSignature);
    }

    #[test]
    fn past_expiry_is_rejected() {
        let now = Utc::now();
        let issued = issuer().issue(UserId::new(), "alice", Role::User, now).unwrap();

        let err = Hs256JwtValidator::new(SECRET)
            .validate(&issued.token, now + Duration::hours(2))
            .unwrap_err();

        assert_eq!(err, TokenError::Claims(TokenValidationError::Expired));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = Hs256JwtValidator::new(SECRET)
            .validate("not.a.jwt", Utc::now())
            .unwrap_err();
        assert!(matches!(err, TokenError::Malformed(_)));
    }
}
