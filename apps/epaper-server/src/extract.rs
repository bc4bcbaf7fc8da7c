//! Bearer-token session extractors

use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use epaper_core::User;

use crate::error::ServerError;
use crate::state::AppState;

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// The caller's session, if any. Never rejects.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser {
    pub token: Option<String>,
    /// Set only when the token is live
    pub user: Option<User>,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts);
        let user = match &token {
            Some(token) => state.auth.current_user(token).await,
            None => None,
        };
        Ok(Self { token, user })
    }
}

/// A signed-in caller. Rejects with 401 otherwise.
#[derive(Debug, Clone)]
pub struct RequireUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for RequireUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let current = match CurrentUser::from_request_parts(parts, state).await {
            Ok(current) => current,
            Err(never) => match never {},
        };
        current.user.map(RequireUser).ok_or(ServerError::Unauthorized)
    }
}
