use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use bytes::Bytes;

use crate::services::notifications::{Ack, RejectionKind, ACCEPTED_BODY, REJECTED_BODY};
use crate::AppState;

/// Processor webhook. The body is read raw so signatures are checked against what was sent.
#[utoipa::path(
    post,
    path = "/api/v1/notifications",
    request_body = String,
    responses(
        (status = 200, description = "Every item applied", body = String, example = json!("[accepted]")),
        (status = 401, description = "Credentials or signature mismatch", body = String, example = json!("[rejected]")),
        (status = 422, description = "Delivery could not be applied", body = String, example = json!("[rejected]")),
    ),
    tag = "Notifications"
)]
pub async fn receive_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    match state.notifications.handle(&headers, &body).await {
        Ack::Accepted => (StatusCode::OK, ACCEPTED_BODY),
        Ack::Rejected {
            kind: RejectionKind::Unauthenticated,
            ..
        } => (StatusCode::UNAUTHORIZED, REJECTED_BODY),
        Ack::Rejected { .. } => (StatusCode::UNPROCESSABLE_ENTITY, REJECTED_BODY),
    }
}
