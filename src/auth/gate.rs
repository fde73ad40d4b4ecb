use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use super::session::{Identity, resolve_identity};
use crate::config::Auth;
use crate::error::ShelfError;
use crate::handler::AppState;

/// Prefixes that never require a session: auth callbacks, static assets and
/// the login page itself.
const PUBLIC_PREFIXES: &[&str] = &[
    "/api/auth",
    "/_next/static",
    "/_next/image",
    "/favicon.ico",
    "/login",
    "/assets",
    "/healthz",
];

/// Exam detail reads stay open to anonymous visitors.
const PUBLIC_READ_PREFIX: &str = "/api/exams/";

#[derive(Debug, Clone)]
pub struct LoginGate {
    login_path: String,
    public_prefixes: Vec<String>,
}

impl LoginGate {
    pub fn new(auth: &Auth) -> Self {
        let mut public_prefixes: Vec<String> = PUBLIC_PREFIXES.iter().map(|p| p.to_string()).collect();
        public_prefixes.push(auth.login_path.clone());
        public_prefixes.extend(auth.public_paths.iter().cloned());
        public_prefixes.retain(|p| !p.is_empty());
        public_prefixes.sort();
        public_prefixes.dedup();

        LoginGate {
            login_path: auth.login_path.clone(),
            public_prefixes,
        }
    }

    pub fn is_public(&self, method: &Method, path: &str) -> bool {
        if self.public_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return true;
        }
        (method == Method::GET || method == Method::HEAD) && path.starts_with(PUBLIC_READ_PREFIX)
    }

    pub fn login_redirect(&self, path_and_query: &str) -> String {
        format!(
            "{}?callbackUrl={}",
            self.login_path,
            urlencoding::encode(path_and_query)
        )
    }
}

/// Sends visitors without a session to the login page. API calls get a 401
/// instead of a redirect.
pub async fn require_login(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if state.gate.is_public(req.method(), req.uri().path()) {
        return next.run(req).await;
    }

    let identity = resolve_identity(state.db.as_ref(), req.headers(), &state.auth.session_cookie).await;
    let logged_in = identity.is_some();
    req.extensions_mut().insert(Identity(identity));
    if logged_in {
        return next.run(req).await;
    }

    if req.uri().path().starts_with("/api/") {
        return ShelfError::Unauthenticated.into_response();
    }

    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    tracing::debug!(path = %req.uri().path(), "redirecting to login");
    Redirect::temporary(&state.gate.login_redirect(target)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> LoginGate {
        LoginGate::new(&Auth {
            public_paths: vec!["/about".to_string()],
            ..Auth::default()
        })
    }

    #[test]
    fn static_and_auth_paths_are_public() {
        let gate = gate();
        for path in [
            "/api/auth/callback/google",
            "/_next/static/chunk.js",
            "/_next/image",
            "/favicon.ico",
            "/login",
            "/assets/logo.png",
            "/healthz",
            "/about",
        ] {
            assert!(gate.is_public(&Method::GET, path), "{path} should be public");
        }
    }

    #[test]
    fn configured_duplicates_collapse() {
        let gate = LoginGate::new(&Auth {
            public_paths: vec!["/about".to_string(), "/login".to_string(), "/about".to_string()],
            ..Auth::default()
        });
        for prefix in ["/login", "/about"] {
            let seen = gate.public_prefixes.iter().filter(|p| p.as_str() == prefix).count();
            assert_eq!(seen, 1, "{prefix} should appear once");
        }
    }

    #[test]
    fn pages_and_writes_are_gated() {
        let gate = gate();
        assert!(!gate.is_public(&Method::GET, "/"));
        assert!(!gate.is_public(&Method::GET, "/user"));
        assert!(!gate.is_public(&Method::GET, "/api/me"));
        assert!(!gate.is_public(&Method::POST, "/api/exams/abc/flash"));
        assert!(!gate.is_public(&Method::PUT, "/api/exams/abc/folders"));
    }

    #[test]
    fn exam_reads_stay_public() {
        let gate = gate();
        assert!(gate.is_public(&Method::GET, "/api/exams/abc"));
        assert!(gate.is_public(&Method::HEAD, "/api/exams/abc"));
    }

    #[test]
    fn redirect_carries_encoded_callback() {
        let gate = gate();
        assert_eq!(
            gate.login_redirect("/exam/abc?tab=files"),
            "/login?callbackUrl=%2Fexam%2Fabc%3Ftab%3Dfiles"
        );
    }
}
