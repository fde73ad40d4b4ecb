//! HTTP Handlers for the Shelf API

use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::Shelf;
use crate::api::{not_found, success};
use crate::auth::{CurrentUser, MaybeUser};
use crate::handler::AppState;
use crate::model::{ExamId, FolderId};

#[derive(Debug, Deserialize)]
pub struct UpdateFoldersRequest {
    #[serde(default, alias = "folderIds")]
    pub folder_ids: Vec<FolderId>,
}

pub async fn get_exam(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<String>,
) -> Response {
    let shelf = Shelf::new(state.db.as_ref(), &state.views);

    match shelf.get_exam(&ExamId::new(id), viewer.as_ref()).await {
        Ok(Some(view)) => success(view),
        Ok(None) => not_found("exam not found"),
        Err(e) => e.into_response(),
    }
}

pub async fn toggle_flash(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Response {
    let shelf = Shelf::new(state.db.as_ref(), &state.views);

    match shelf.toggle_flash(&user_id, &ExamId::new(id)).await {
        Ok(flash) => success(flash),
        Err(e) => e.into_response(),
    }
}

pub async fn toggle_save(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Response {
    let shelf = Shelf::new(state.db.as_ref(), &state.views);

    match shelf.toggle_save(&user_id, &ExamId::new(id)).await {
        Ok(save) => success(save),
        Err(e) => e.into_response(),
    }
}

pub async fn update_exam_folders(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateFoldersRequest>,
) -> Response {
    let shelf = Shelf::new(state.db.as_ref(), &state.views);

    match shelf
        .update_exam_folders(&user_id, &ExamId::new(id), &payload.folder_ids)
        .await
    {
        Ok(folders) => success(folders),
        Err(e) => e.into_response(),
    }
}
