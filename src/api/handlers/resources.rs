use crate::api::error::AppError;
use crate::models::{Identity, Role};
use crate::services::browse::{BrowseFilter, BrowseResult};
use crate::services::submission::{SubmissionForm, SubmissionReceipt, UploadedFile};
use axum::{
    Extension, Json,
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::Redirect,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[utoipa::path(
    get,
    path = "/resources",
    params(BrowseFilter),
    responses(
        (status = 200, description = "Approved resources grouped by file", body = BrowseResult)
    ),
    tag = "resources"
)]
pub async fn browse_resources(
    State(state): State<crate::AppState>,
    Query(filter): Query<BrowseFilter>,
) -> Json<BrowseResult> {
    let result = match state.catalog.load_lookups().await {
        Ok(lookups) => state.browse.browse(&lookups, &filter).await,
        Err(e) => {
            tracing::warn!("Lookup load failed during browse: {}", e);
            state.browse.fallback(&filter)
        }
    };
    Json(result)
}

/// Multipart body accepted by `POST /resources`.
#[derive(Deserialize, ToSchema)]
#[allow(dead_code)]
pub struct SubmissionUpload {
    title: String,
    description: Option<String>,
    /// notes | pyq | syllabus | lab
    #[serde(rename = "type")]
    resource_type: String,
    /// Repeat the field once per department id
    department_ids: Vec<String>,
    /// Repeat the field once per semester id
    semester_ids: Vec<String>,
    /// Repeat the field once per subject name
    subject_names: Vec<String>,
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

async fn read_form(mut multipart: Multipart) -> Result<SubmissionForm, AppError> {
    let mut form = SubmissionForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed upload: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Malformed upload: {}", e)))?;
            // Browsers send an empty part when no file was picked.
            if !(data.is_empty() && filename.is_empty()) {
                form.file = Some(UploadedFile { filename, data });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::Validation(format!("Malformed upload: {}", e)))?;
        match name.as_str() {
            "title" => form.title = Some(value),
            "description" => form.description = Some(value),
            "type" => form.resource_type = Some(value),
            "department_ids" => form.department_ids.push(value),
            "semester_ids" => form.semester_ids.push(value),
            "subject_names" => form.subject_names.push(value),
            other => tracing::debug!("Ignoring unknown upload field {}", other),
        }
    }

    Ok(form)
}

#[utoipa::path(
    post,
    path = "/resources",
    request_body(content = SubmissionUpload, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Stored and awaiting approval", body = SubmissionReceipt),
        (status = 400, description = "Missing or invalid input"),
        (status = 401, description = "Not signed in"),
        (status = 502, description = "Blob storage failure")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "resources"
)]
pub async fn submit_resource(
    State(state): State<crate::AppState>,
    identity: Option<Extension<Identity>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SubmissionReceipt>), AppError> {
    let form = read_form(multipart).await?;
    let lookups = state.catalog.load_lookups().await?;
    let uploader = identity.as_ref().map(|Extension(identity)| identity);

    let receipt = state.submissions.submit(uploader, &lookups, form).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct OpenFileQuery {
    /// Stored file path, `{uploaderId}/{epochMillis}.{ext}`
    pub path: String,
    /// Return the URL as JSON instead of redirecting
    #[serde(default)]
    pub json: bool,
}

#[derive(Serialize, ToSchema)]
pub struct SignedUrlResponse {
    pub url: String,
}

#[utoipa::path(
    get,
    path = "/resources/open",
    params(OpenFileQuery),
    responses(
        (status = 302, description = "Redirect to a signed URL"),
        (status = 200, description = "Signed URL", body = SignedUrlResponse),
        (status = 404, description = "No such file")
    ),
    tag = "resources"
)]
pub async fn open_resource_file(
    State(state): State<crate::AppState>,
    identity: Option<Extension<Identity>>,
    Query(query): Query<OpenFileQuery>,
) -> Result<axum::response::Response, AppError> {
    use axum::response::IntoResponse;

    let is_admin = match identity {
        Some(Extension(identity)) => state.auth.role_of(&identity.id).await? == Some(Role::Admin),
        None => false,
    };

    let url = state.browse.open_file(&query.path, is_admin).await?;
    if query.json {
        Ok(Json(SignedUrlResponse { url }).into_response())
    } else {
        Ok(Redirect::to(&url).into_response())
    }
}
