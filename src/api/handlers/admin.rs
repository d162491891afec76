use crate::api::error::AppError;
use crate::models::{Identity, ResourceType};
use crate::services::grouping::ModerationGroup;
use crate::services::moderation::{DecisionOutcome, DecisionRequest, DeletedGroup};
use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
pub struct PendingQuery {
    /// Restrict the queue to one resource type
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
}

#[utoipa::path(
    get,
    path = "/admin/pending",
    params(PendingQuery),
    responses(
        (status = 200, description = "Pending groups, oldest first", body = Vec<ModerationGroup>),
        (status = 403, description = "Admin access only")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "admin"
)]
pub async fn list_pending(
    State(state): State<crate::AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<Vec<ModerationGroup>>, AppError> {
    let resource_type = match query.resource_type.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(
            raw.parse::<ResourceType>()
                .map_err(|e| AppError::Validation(e.to_string()))?,
        ),
    };

    let groups = state
        .moderation
        .list_pending(Some(&identity), resource_type)
        .await?;
    Ok(Json(groups))
}

#[utoipa::path(
    get,
    path = "/admin/approved",
    responses(
        (status = 200, description = "Most recent approved groups", body = Vec<ModerationGroup>),
        (status = 403, description = "Admin access only")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "admin"
)]
pub async fn list_approved(
    State(state): State<crate::AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<ModerationGroup>>, AppError> {
    Ok(Json(state.moderation.list_approved(Some(&identity)).await?))
}

#[utoipa::path(
    post,
    path = "/admin/decisions",
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Decision applied to the whole group", body = DecisionOutcome),
        (status = 403, description = "Admin access only"),
        (status = 404, description = "Group already moderated"),
        (status = 502, description = "Blob removal failed; nothing changed")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "admin"
)]
pub async fn decide(
    State(state): State<crate::AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<DecisionOutcome>, AppError> {
    Ok(Json(state.moderation.decide(Some(&identity), req).await?))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DeleteApprovedQuery {
    pub file_path: String,
}

#[utoipa::path(
    delete,
    path = "/admin/approved",
    params(DeleteApprovedQuery),
    responses(
        (status = 200, description = "Approved group removed", body = DeletedGroup),
        (status = 403, description = "Admin access only"),
        (status = 404, description = "No approved resources at this path"),
        (status = 502, description = "Blob removal failed")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "admin"
)]
pub async fn delete_approved(
    State(state): State<crate::AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<DeleteApprovedQuery>,
) -> Result<Json<DeletedGroup>, AppError> {
    let deleted = state
        .moderation
        .delete_approved(Some(&identity), &query.file_path)
        .await?;
    Ok(Json(deleted))
}
