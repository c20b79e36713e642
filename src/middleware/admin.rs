// ============================================================================
// Role guards
// ============================================================================
//
// Must run after auth_middleware, which puts the Claims into the extensions,
// so the guard layer is added first:
//
//   .layer(middleware::from_fn(supervisor_middleware))
//   .layer(middleware::from_fn_with_state(config, auth_middleware))
//
// ============================================================================

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};

use crate::middleware::auth::Claims;

/// Bulk updates, deletions and liquidation imports.
pub async fn supervisor_middleware(request: Request, next: Next) -> Result<Response, StatusCode> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !claims.can_supervise() {
        tracing::warn!(
            "Supervisor access denied for user {} ({}) with role {:?}",
            claims.user_id,
            claims.email,
            claims.role
        );
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(request).await)
}

/// User management.
pub async fn admin_middleware(request: Request, next: Next) -> Result<Response, StatusCode> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !claims.is_admin() {
        tracing::warn!(
            "Admin access denied for user {} ({}) with role {:?}",
            claims.user_id,
            claims.email,
            claims.role
        );
        return Err(StatusCode::FORBIDDEN);
    }

    tracing::debug!("Admin access granted to user {}", claims.user_id);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;
    use axum::{body::Body, middleware, routing::get, Router};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn claims(role: UserRole) -> Claims {
        Claims {
            sub: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            full_name: "Test".to_string(),
            role,
            exp: 9999999999,
            iat: 1234567890,
            jti: Uuid::new_v4().to_string(),
        }
    }

    async fn status_for(role: Option<UserRole>, admin_only: bool) -> StatusCode {
        let guard = if admin_only {
            Router::new()
                .route("/", get(|| async { "ok" }))
                .layer(middleware::from_fn(admin_middleware))
        } else {
            Router::new()
                .route("/", get(|| async { "ok" }))
                .layer(middleware::from_fn(supervisor_middleware))
        };

        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        if let Some(role) = role {
            request.extensions_mut().insert(claims(role));
        }
        guard.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_supervisor_guard() {
        assert_eq!(status_for(None, false).await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(Some(UserRole::Operator), false).await, StatusCode::FORBIDDEN);
        assert_eq!(status_for(Some(UserRole::Supervisor), false).await, StatusCode::OK);
        assert_eq!(status_for(Some(UserRole::Admin), false).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_guard() {
        assert_eq!(status_for(Some(UserRole::Supervisor), true).await, StatusCode::FORBIDDEN);
        assert_eq!(status_for(Some(UserRole::Admin), true).await, StatusCode::OK);
    }
}
