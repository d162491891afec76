use crate::api::error::AppError;
use crate::models::Identity;
use crate::services::auth::{CODE_SENT, CurrentUser, SessionToken};
use crate::utils::auth::Claims;
use axum::{Extension, Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Deserialize, ToSchema, Validate)]
pub struct CodeRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct VerifyRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

#[utoipa::path(
    post,
    path = "/auth/code",
    request_body = CodeRequest,
    responses(
        (status = 200, description = "Sign-in code sent", body = MessageResponse),
        (status = 400, description = "Invalid email")
    ),
    tag = "auth"
)]
pub async fn request_code(
    State(state): State<crate::AppState>,
    Json(req): Json<CodeRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    state.auth.request_code(&req.email).await?;

    Ok(Json(MessageResponse {
        message: CODE_SENT.to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/verify",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionToken),
        (status = 401, description = "Invalid or expired code"),
        (status = 429, description = "Too many failed attempts")
    ),
    tag = "auth"
)]
pub async fn verify_code(
    State(state): State<crate::AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<SessionToken>, AppError> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let session = state.auth.verify_code(&req.email, &req.code).await?;
    Ok(Json(session))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Signed-in user", body = CurrentUser),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "auth"
)]
pub async fn me(
    State(state): State<crate::AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<CurrentUser>, AppError> {
    Ok(Json(state.auth.current_user(&identity).await?))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Signed out"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, AppError> {
    state.auth.sign_out(&claims).await?;
    Ok(StatusCode::NO_CONTENT)
}
