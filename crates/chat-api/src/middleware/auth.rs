//! Identity extractors.
//!
//! The access token is looked up in the `Authorization: Bearer` header,
//! then the `access_token` cookie, then the `token` query parameter. The
//! last one exists for browser WebSocket clients, which cannot set headers.

use axum::extract::{FromRequestParts, Query};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use serde::Deserialize;
use tracing::debug;

use chat_shared::UserId;

use crate::error::ApiError;
use crate::state::AppState;

const ACCESS_TOKEN_COOKIE: &str = "access_token";

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn cookie_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == ACCESS_TOKEN_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|token| !token.is_empty())
}

fn query_token(parts: &Parts) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()?
        .0
        .token
        .filter(|token| !token.is_empty())
}

fn find_token(parts: &Parts) -> Option<String> {
    bearer_token(parts)
        .or_else(|| cookie_token(parts))
        .or_else(|| query_token(parts))
}

/// Authenticated caller; rejects with 401 when no valid token is present.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserId);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = find_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("Missing access token".to_string()))?;

        let claims = state
            .jwt
            .validate_access_token(&token)
            .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

        Ok(AuthUser(claims.sub))
    }
}

/// Caller identity if one was presented and valid. Lets the handler decide
/// how an anonymous caller is refused.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<UserId>);

impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = find_token(parts).and_then(|token| match state.jwt.validate_access_token(&token) {
            Ok(claims) => Some(claims.sub),
            Err(e) => {
                debug!("Ignoring invalid access token: {}", e);
                None
            }
        });

        Ok(MaybeAuthUser(user))
    }
}
