use crate::AppState;
use crate::models::Identity;
use crate::utils::auth::Claims;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

#[derive(Deserialize)]
struct AuthQuery {
    token: Option<String>,
}

fn bearer_token(req: &Request) -> Option<String> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|s| s.to_string());

    auth_header.or_else(|| {
        // Try query parameter
        let query = req.uri().query().unwrap_or_default();
        serde_urlencoded::from_str::<AuthQuery>(query)
            .ok()
            .and_then(|q| q.token)
    })
}

async fn attach_session(state: &AppState, req: &mut Request) -> Result<bool, StatusCode> {
    let Some(token) = bearer_token(req) else {
        return Ok(false);
    };

    match state.auth.authenticate(&token).await {
        Ok(claims) => {
            insert_identity(req, claims);
            Ok(true)
        }
        Err(crate::api::error::AppError::Unauthorized(_)) => Ok(false),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

fn insert_identity(req: &mut Request, claims: Claims) {
    req.extensions_mut().insert(Identity {
        id: claims.sub.clone(),
        email: claims.email.clone(),
    });
    req.extensions_mut().insert(claims);
}

/// Rejects requests without a live session.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if attach_session(&state, &mut req).await? {
        Ok(next.run(req).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// Attaches the caller when a live session is presented; anonymous requests
/// pass through so handlers can answer them themselves.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    attach_session(&state, &mut req).await?;
    Ok(next.run(req).await)
}
