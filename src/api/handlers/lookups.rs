use crate::api::error::AppError;
use crate::services::catalog::{
    LookupTables, SubjectChoice, SubjectOptions, SubjectOptionsQuery,
};
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use utoipa::IntoParams;

#[utoipa::path(
    get,
    path = "/lookups",
    responses(
        (status = 200, description = "Departments, semesters and subjects", body = LookupTables)
    ),
    tag = "catalog"
)]
pub async fn get_lookups(
    State(state): State<crate::AppState>,
) -> Result<Json<LookupTables>, AppError> {
    Ok(Json(state.catalog.load_lookups().await?))
}

#[utoipa::path(
    get,
    path = "/subjects/options",
    params(SubjectOptionsQuery),
    responses(
        (status = 200, description = "Subjects for the browse filter", body = SubjectOptions),
        (status = 400, description = "Unknown resource type")
    ),
    tag = "catalog"
)]
pub async fn subject_options(
    State(state): State<crate::AppState>,
    Query(query): Query<SubjectOptionsQuery>,
) -> Result<Json<SubjectOptions>, AppError> {
    let lookups = state.catalog.load_lookups().await?;
    Ok(Json(state.catalog.subject_options(&lookups, &query).await?))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SubmissionSubjectsQuery {
    /// Comma separated department ids; empty means all
    pub department_ids: Option<String>,
    /// Comma separated semester ids; empty means all
    pub semester_ids: Option<String>,
}

fn split_ids(raw: &Option<String>) -> Vec<String> {
    raw.as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[utoipa::path(
    get,
    path = "/subjects/submission",
    params(SubmissionSubjectsQuery),
    responses(
        (status = 200, description = "Subject names offered on the upload form", body = Vec<SubjectChoice>)
    ),
    tag = "catalog"
)]
pub async fn submission_subjects(
    State(state): State<crate::AppState>,
    Query(query): Query<SubmissionSubjectsQuery>,
) -> Result<Json<Vec<SubjectChoice>>, AppError> {
    let lookups = state.catalog.load_lookups().await?;
    Ok(Json(lookups.submission_subjects(
        &split_ids(&query.department_ids),
        &split_ids(&query.semester_ids),
    )))
}
