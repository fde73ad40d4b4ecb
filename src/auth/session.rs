use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use std::convert::Infallible;

use crate::error::ShelfError;
use crate::handler::AppState;
use crate::model::UserId;
use crate::store::SessionStore;

/// Identity resolved for the current request, cached in request extensions so
/// the session is looked up at most once.
#[derive(Debug, Clone)]
pub struct Identity(pub Option<UserId>);

/// Bearer token first, then the session cookie.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Lookup failures count as "not logged in"; they are logged, never raised.
pub async fn resolve_identity<S: SessionStore>(
    store: &S,
    headers: &HeaderMap,
    cookie_name: &str,
) -> Option<UserId> {
    let token = session_token(headers, cookie_name)?;
    match store.find_session_user(&token).await {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::error!(error = %e, "session lookup failed");
            None
        }
    }
}

async fn identity(parts: &mut Parts, state: &AppState) -> Option<UserId> {
    if let Some(Identity(resolved)) = parts.extensions.get::<Identity>() {
        return resolved.clone();
    }

    let resolved = resolve_identity(state.db.as_ref(), &parts.headers, &state.auth.session_cookie).await;
    parts.extensions.insert(Identity(resolved.clone()));
    resolved
}

/// A logged-in user. Rejects with `ShelfError::Unauthenticated`.
pub struct CurrentUser(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ShelfError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        identity(parts, state)
            .await
            .map(CurrentUser)
            .ok_or(ShelfError::Unauthenticated)
    }
}

/// The viewer, if there is one. Never rejects.
pub struct MaybeUser(pub Option<UserId>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(identity(parts, state).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc123; other=x"),
        );
        assert_eq!(session_token(&headers, "session").as_deref(), Some("abc123"));
        assert_eq!(session_token(&headers, "sid"), None);
    }

    #[test]
    fn bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("session=fromcookie"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer fromheader"));
        assert_eq!(session_token(&headers, "session").as_deref(), Some("fromheader"));
    }

    #[test]
    fn empty_values_are_no_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("session="));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(session_token(&headers, "session"), None);
    }
}
