//! Authentication middleware.
//!
//! The bearer token is taken as the caller id; validating it belongs to the
//! external authentication layer. The optional role header defaults to
//! `user`. Without `AUTH_SECRET` a request with no credentials is served as
//! `anonymous` (development mode).

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tally_engine::{Identity, DEFAULT_ROLE};

use crate::error::AppError;
use crate::AppState;

/// Header carrying the caller role.
pub const ROLE_HEADER: &str = "x-user-role";

const ANONYMOUS: &str = "anonymous";

/// Authenticated caller extracted from request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub identity: Identity,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let role = parts
            .headers
            .get(ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .unwrap_or(DEFAULT_ROLE)
            .to_string();

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        match auth_header {
            Some(header) if header.starts_with("Bearer ") => {
                let token = header.trim_start_matches("Bearer ").trim();
                if token.is_empty() {
                    return Err(AppError::Unauthorized("Empty bearer token"));
                }
                Ok(AuthUser {
                    identity: Identity::new(token, role),
                })
            }
            Some(_) => Err(AppError::Unauthorized(
                "Invalid authorization header format",
            )),
            None if state.config.auth_secret.is_none() => Ok(AuthUser {
                identity: Identity::new(ANONYMOUS, role),
            }),
            None => Err(AppError::Unauthorized("Missing authorization header")),
        }
    }
}
