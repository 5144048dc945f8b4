//! Root endpoint; intentionally undocumented in the OpenAPI spec.

use axum::response::IntoResponse;

pub async fn root() -> impl IntoResponse {
    crate::APP_USER_AGENT
}
