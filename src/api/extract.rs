//! Request extractors: bearer sessions and cart ownership.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::error::ApiError;
use super::AppState;
use crate::application::Actor;
use crate::domain::aggregates::CartOwner;
use crate::error::EcommerceError;

pub const CART_SESSION_HEADER: &str = "x-cart-session";

pub fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

pub fn cart_session(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(CART_SESSION_HEADER)?.to_str().ok()?.trim();
    (8..=128).contains(&value.len()).then(|| value.to_string())
}

/// A signed-in caller; 401 otherwise.
pub struct AuthUser(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(EcommerceError::Unauthorized)?;
        Ok(Self(state.services.auth.authenticate(&token).await?))
    }
}

/// The raw bearer token, for logout.
pub struct Bearer(pub String);

#[async_trait]
impl FromRequestParts<AppState> for Bearer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        bearer_token(parts).map(Self).ok_or(ApiError(EcommerceError::Unauthorized))
    }
}

/// The signed-in user's cart, or the anonymous one named by `X-Cart-Session`.
pub struct CartCaller(pub CartOwner);

#[async_trait]
impl FromRequestParts<AppState> for CartCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(token) = bearer_token(parts) {
            let actor = state.services.auth.authenticate(&token).await?;
            return Ok(Self(CartOwner::User(actor.user_id)));
        }
        cart_session(parts)
            .map(|session| Self(CartOwner::Session(session)))
            .ok_or_else(|| ApiError(EcommerceError::validation("sign in or send an X-Cart-Session header of 8 to 128 characters")))
    }
}

/// Anonymous cart key sent along with a login, if any.
pub struct CartSession(pub Option<String>);

#[async_trait]
impl FromRequestParts<AppState> for CartSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(cart_session(parts)))
    }
}
