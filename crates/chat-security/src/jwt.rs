//! JWT token handling

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const TOKEN_TYPE_ACCESS: &str = "access";

#[derive(Error, Debug)]
pub enum JwtError {
    #[error("Token creation failed: {0}")]
    CreationError(String),
    #[error("Token validation failed: {0}")]
    ValidationError(String),
    #[error("Token expired")]
    TokenExpired,
    #[error("Unexpected token type: {0}")]
    WrongTokenType(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Opaque user identifier issued by the identity provider.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub token_type: String,
}

#[derive(Clone)]
pub struct JwtService {
    secret: String,
    access_token_expiry: i64,
}

impl JwtService {
    pub fn new(secret: String, access_expiry: i64) -> Self {
        Self {
            secret,
            access_token_expiry: access_expiry,
        }
    }

    pub fn generate_access_token(&self, user_id: &str) -> Result<String, JwtError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.access_token_expiry)).timestamp(),
            token_type: TOKEN_TYPE_ACCESS.to_string(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| JwtError::CreationError(e.to_string()))
    }

    /// Validates signature, expiry and token type, returning the claims.
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::TokenExpired,
            _ => JwtError::ValidationError(e.to_string()),
        })?;

        if claims.token_type != TOKEN_TYPE_ACCESS {
            return Err(JwtError::WrongTokenType(claims.token_type));
        }
        if claims.sub.is_empty() {
            return Err(JwtError::ValidationError("empty subject".to_string()));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_validate() {
        let jwt = JwtService::new("secret".to_string(), 600);
        let token = jwt.generate_access_token("user-42").unwrap();

        let claims = jwt.validate_access_token(&token).unwrap();
        assert_eq!(claims.sub, "user-42");
        assert_eq!(claims.token_type, "access");
    }

    #[test]
    fn test_rejects_foreign_signature() {
        let issuer = JwtService::new("secret-a".to_string(), 600);
        let verifier = JwtService::new("secret-b".to_string(), 600);
        let token = issuer.generate_access_token("user-42").unwrap();

        assert!(matches!(
            verifier.validate_access_token(&token),
            Err(JwtError::ValidationError(_))
        ));
    }

    #[test]
    fn test_rejects_expired_token() {
        // Default validation leeway is 60 seconds.
        let jwt = JwtService::new("secret".to_string(), -3600);
        let token = jwt.generate_access_token("user-42").unwrap();

        assert!(matches!(jwt.validate_access_token(&token), Err(JwtError::TokenExpired)));
    }

    #[test]
    fn test_rejects_refresh_token_type() {
        let now = Utc::now();
        let claims = Claims {
            sub: "user-42".to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(600)).timestamp(),
            token_type: "refresh".to_string(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let jwt = JwtService::new("secret".to_string(), 600);
        assert!(matches!(
            jwt.validate_access_token(&token),
            Err(JwtError::WrongTokenType(_))
        ));
    }
}
