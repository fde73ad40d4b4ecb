use crate::handler::{AppState, create_folder, get_profile, healthcheck};
use axum::{
    Router,
    http::Method,
    middleware,
    routing::{get, post},
};
use std::error::Error;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handler;
pub mod model;
pub mod revalidate;
pub mod shelf;
pub mod store;

pub fn unpack_error(err: &(dyn Error)) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthcheck))
        .route("/api/me", get(get_profile))
        .route("/api/folders", post(create_folder))
        .nest("/api/exams", shelf::routes())
        .merge(auth::routes())
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_login))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::unpack_error;

    #[test]
    fn unpack_error_walks_the_source_chain() {
        let err = crate::error::ShelfError::StoreFailure(anyhow::anyhow!("database is locked"));
        let unpacked = unpack_error(&err);
        assert!(unpacked.starts_with("store failure: database is locked"));
        assert!(unpacked.matches("database is locked").count() >= 2);
    }
}
