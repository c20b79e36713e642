// ============================================================================
// Admin Handlers - user accounts
// ============================================================================
//
// Mounted behind admin_middleware; only admins reach these endpoints.
//
// ============================================================================

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::handlers::auth::auth_service;
use crate::middleware::{error_handling::{AppError, Result}, Claims};
use crate::models::user::{CreateUserRequest, SetUserActiveRequest, UserResponse};

/// GET /api/admin/users
pub async fn list_users(State(config): State<AppConfig>) -> Result<Json<Vec<UserResponse>>> {
    let users = auth_service(&config).list_users().await?;
    Ok(Json(users))
}

/// POST /api/admin/users
pub async fn create_user(
    State(config): State<AppConfig>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    request.validate().map_err(AppError::Validation)?;

    let user = auth_service(&config).create_user(request).await?;
    tracing::info!("Admin {} created user {}", claims.user_id, user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

/// PUT /api/admin/users/:id/active
pub async fn set_user_active(
    State(config): State<AppConfig>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<SetUserActiveRequest>,
) -> Result<Json<UserResponse>> {
    let user = auth_service(&config)
        .set_active(&claims, user_id, request.is_active)
        .await?;
    Ok(Json(user))
}
