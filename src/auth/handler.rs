use axum::{
    extract::{Query, State},
    response::Response,
};
use serde::{Deserialize, Serialize};

use crate::api::success;
use crate::handler::AppState;

const LOGIN_LABEL: &str = "立即登入";

#[derive(Debug, Deserialize)]
pub struct LoginParams {
    #[serde(rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPrompt {
    pub provider: String,
    pub label: &'static str,
    pub signin_url: String,
}

// Only same-site paths; anything else would make /login an open redirect.
// Browsers read `/\` as `//`, so backslashes and control characters are out.
fn is_local_path(url: &str) -> bool {
    url.starts_with('/')
        && !url.starts_with("//")
        && !url.contains('\\')
        && !url.chars().any(char::is_control)
}

pub async fn login_prompt(State(state): State<AppState>, Query(params): Query<LoginParams>) -> Response {
    let callback = params
        .callback_url
        .filter(|url| is_local_path(url))
        .unwrap_or_else(|| "/".to_string());

    let signin_url = format!(
        "{}/{}?callbackUrl={}",
        state.auth.signin_base.trim_end_matches('/'),
        state.auth.provider,
        urlencoding::encode(&callback)
    );

    success(LoginPrompt {
        provider: state.auth.provider.clone(),
        label: LOGIN_LABEL,
        signin_url,
    })
}

#[cfg(test)]
mod tests {
    use super::is_local_path;

    #[test]
    fn only_local_callbacks_are_kept() {
        assert!(is_local_path("/exam/1"));
        assert!(!is_local_path("//evil.example"));
        assert!(!is_local_path("https://evil.example"));
        assert!(!is_local_path("/\\evil.example"));
        assert!(!is_local_path("/\t/evil.example"));
        assert!(!is_local_path("/exam\n/1"));
    }
}
