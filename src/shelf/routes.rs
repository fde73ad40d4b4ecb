use axum::{
    Router,
    routing::{get, post, put},
};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:id", get(handler::get_exam))
        .route("/:id/flash", post(handler::toggle_flash))
        .route("/:id/save", post(handler::toggle_save))
        .route("/:id/folders", put(handler::update_exam_folders))
}
