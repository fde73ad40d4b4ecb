use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::api::ErrorResponse;

/// Shown to anyone who tries to change their shelf without a session.
pub const LOGIN_REQUIRED: &str = "請先登入";

#[derive(Debug, thiserror::Error)]
pub enum ShelfError {
    #[error("{}", LOGIN_REQUIRED)]
    Unauthenticated,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("store failure: {0}")]
    StoreFailure(#[source] anyhow::Error),
}

impl ShelfError {
    pub fn status(&self) -> StatusCode {
        use ShelfError::*;
        match self {
            Unauthenticated => StatusCode::UNAUTHORIZED,
            NotFound(_) => StatusCode::NOT_FOUND,
            InvalidInput(_) => StatusCode::BAD_REQUEST,
            StoreFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            // The chain is already in the logs; clients get the short form.
            ShelfError::StoreFailure(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<anyhow::Error> for ShelfError {
    fn from(error: anyhow::Error) -> Self {
        ShelfError::StoreFailure(error)
    }
}

impl IntoResponse for ShelfError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

pub type ShelfResult<T> = Result<T, ShelfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_errors_to_status_codes() {
        assert_eq!(ShelfError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ShelfError::NotFound("exam").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ShelfError::InvalidInput("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ShelfError::StoreFailure(anyhow::anyhow!("disk gone")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unauthenticated_message_is_the_login_prompt() {
        assert_eq!(ShelfError::Unauthenticated.to_string(), "請先登入");
        assert_eq!(ShelfError::NotFound("user").to_string(), "user not found");
    }

    #[test]
    fn store_failures_do_not_leak_details() {
        let err = ShelfError::StoreFailure(anyhow::anyhow!("no such table: folders"));
        assert_eq!(err.public_message(), "internal error");
    }
}
