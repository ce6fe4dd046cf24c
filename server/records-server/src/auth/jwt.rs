//! HS256 access and refresh tokens

use access_control::{Role, UserId};
use chrono::Utc;
use database_layer::User;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};

pub const TOKEN_TYPE: &str = "Bearer";

/// Which endpoint family a token is good for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

/// Token claims
///
/// `role`, `username` and `email` are informational for clients; the
/// server always re-reads the user from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id
    pub sub: String,
    pub token_use: TokenUse,
    pub role: Role,
    pub username: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    pub fn user_id(&self) -> ApiResult<UserId> {
        self.sub
            .parse()
            .map_err(|_| ApiError::authentication("Token contained no recognizable user identification"))
    }
}

/// Response body of `POST /token`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IssuedToken {
    pub access: String,
    pub refresh: String,
    pub token_type: String,
    /// Seconds until the access token expires
    pub expires_in: u64,
    /// Seconds until the refresh token expires
    pub refresh_expires_in: u64,
    #[schema(value_type = String, example = "teacher")]
    pub role: Role,
    pub username: String,
}

/// Response body of `POST /token/refresh`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshedToken {
    pub access: String,
    pub token_type: String,
    pub expires_in: u64,
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime_secs: u64,
    refresh_lifetime_secs: u64,
}

impl TokenService {
    pub fn new(secret: &str, lifetime_secs: u64, refresh_lifetime_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub", "iat"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            lifetime_secs,
            refresh_lifetime_secs,
        }
    }

    pub fn lifetime_secs(&self) -> u64 {
        self.lifetime_secs
    }

    fn sign(&self, user: &User, token_use: TokenUse) -> ApiResult<String> {
        let lifetime_secs = match token_use {
            TokenUse::Access => self.lifetime_secs,
            TokenUse::Refresh => self.refresh_lifetime_secs,
        };
        let now = Utc::now().timestamp();
        let lifetime = i64::try_from(lifetime_secs).unwrap_or(i64::MAX);
        let claims = TokenClaims {
            sub: user.id.to_string(),
            token_use,
            role: user.role,
            username: user.username.clone(),
            email: user.email.clone(),
            iat: now,
            exp: now.saturating_add(lifetime),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::internal(format!("Failed to sign token: {e}")))
    }

    /// Access and refresh pair for a freshly authenticated user
    pub fn issue(&self, user: &User) -> ApiResult<IssuedToken> {
        Ok(IssuedToken {
            access: self.sign(user, TokenUse::Access)?,
            refresh: self.sign(user, TokenUse::Refresh)?,
            token_type: TOKEN_TYPE.to_string(),
            expires_in: self.lifetime_secs,
            refresh_expires_in: self.refresh_lifetime_secs,
            role: user.role,
            username: user.username.clone(),
        })
    }

    /// New access token; the refresh token itself is not rotated
    pub fn refresh(&self, user: &User) -> ApiResult<RefreshedToken> {
        Ok(RefreshedToken {
            access: self.sign(user, TokenUse::Access)?,
            token_type: TOKEN_TYPE.to_string(),
            expires_in: self.lifetime_secs,
        })
    }

    /// Verify a bearer token presented on an API request
    pub fn verify(&self, token: &str) -> ApiResult<TokenClaims> {
        self.verify_as(token, TokenUse::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> ApiResult<TokenClaims> {
        self.verify_as(token, TokenUse::Refresh)
    }

    fn verify_as(&self, token: &str, expected: TokenUse) -> ApiResult<TokenClaims> {
        let claims = decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected token");
                ApiError::authentication("Given token not valid for any token type")
            })?;

        if claims.token_use != expected {
            tracing::debug!(token_use = ?claims.token_use, expected = ?expected, "Token presented for the wrong use");
            return Err(ApiError::authentication("Token has wrong type"));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 42,
            username: "hopper".to_string(),
            email: "hopper@school.test".to_string(),
            role: Role::Teacher,
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            is_active: true,
            date_joined: Utc::now(),
            password_hash: String::new(),
        }
    }

    #[test]
    fn test_issue_then_verify() {
        let service = TokenService::new("unit-test-secret", 3600, 86_400);
        let issued = service.issue(&user()).unwrap();
        assert_eq!(issued.token_type, "Bearer");
        assert_eq!(issued.expires_in, 3600);

        let claims = service.verify(&issued.access).unwrap();
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.role, Role::Teacher);
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.token_use, TokenUse::Access);
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let service = TokenService::new("unit-test-secret", 3600, 86_400);
        let issued = service.issue(&user()).unwrap();
        assert_eq!(issued.refresh_expires_in, 86_400);

        let claims = service.verify_refresh(&issued.refresh).unwrap();
        assert_eq!(claims.exp - claims.iat, 86_400);
        assert!(service.verify(&issued.refresh).is_err());
        assert!(service.verify_refresh(&issued.access).is_err());
    }

    #[test]
    fn test_refresh_issues_new_access_token() {
        let service = TokenService::new("unit-test-secret", 3600, 86_400);
        let refreshed = service.refresh(&user()).unwrap();
        assert_eq!(refreshed.expires_in, 3600);
        assert_eq!(service.verify(&refreshed.access).unwrap().user_id().unwrap(), 42);
    }

    #[test]
    fn test_foreign_signature_is_rejected() {
        let issued = TokenService::new("one-secret", 60, 600).issue(&user()).unwrap();
        let err = TokenService::new("another-secret", 60, 600)
            .verify(&issued.access)
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let service = TokenService::new("unit-test-secret", 0, 0);
        let issued = service.issue(&user()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert!(service.verify(&issued.access).is_err());
    }
}
