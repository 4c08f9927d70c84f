use axum::response::IntoResponse;

// axum handler for the root route; useful as a cheap liveness probe
pub async fn root() -> impl IntoResponse {
    crate::APP_USER_AGENT
}
