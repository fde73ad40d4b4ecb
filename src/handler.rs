use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::info;

use crate::api::{created, success};
use crate::auth::{CurrentUser, LoginGate};
use crate::config::Auth;
use crate::db::Database;
use crate::error::ShelfError;
use crate::model::{FolderSummary, Profile};
use crate::revalidate::{PROFILE_PATH, Revalidator};
use crate::store::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub views: Revalidator,
    pub auth: Arc<Auth>,
    pub gate: Arc<LoginGate>,
}

impl AppState {
    pub fn new(db: Arc<Database>, auth: Auth) -> Self {
        let gate = Arc::new(LoginGate::new(&auth));
        AppState {
            db,
            views: Revalidator::default(),
            auth: Arc::new(auth),
            gate,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
}

pub async fn healthcheck() -> impl IntoResponse {
    info!("got healthcheck request");
    success("ok")
}

pub async fn get_profile(State(state): State<AppState>, CurrentUser(user_id): CurrentUser) -> Response {
    match state.db.find_user(&user_id).await {
        Ok(Some(user)) => success(Profile::from(user)),
        Ok(None) => ShelfError::NotFound("user").into_response(),
        Err(e) => {
            tracing::error!(op = "get_profile", user_id = %user_id, error = %e, "failed to load profile");
            ShelfError::StoreFailure(e).into_response()
        }
    }
}

pub async fn create_folder(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<CreateFolderRequest>,
) -> Response {
    let name = payload.name.trim();
    if name.is_empty() {
        return ShelfError::InvalidInput("folder name must not be empty".to_string()).into_response();
    }

    match state.db.find_user(&user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return ShelfError::NotFound("user").into_response(),
        Err(e) => {
            tracing::error!(op = "create_folder", user_id = %user_id, error = %e, "failed to load user");
            return ShelfError::StoreFailure(e).into_response();
        }
    }

    match state.db.create_folder(&user_id, name).await {
        Ok(folder) => {
            info!(user_id = %user_id, folder_id = %folder.id, "created folder");
            state.views.revalidate(PROFILE_PATH);
            created(FolderSummary {
                id: folder.id,
                name: folder.name,
                exams: Vec::new(),
            })
        }
        Err(e) => {
            tracing::error!(op = "create_folder", user_id = %user_id, error = %e, "failed to create folder");
            ShelfError::StoreFailure(e).into_response()
        }
    }
}
