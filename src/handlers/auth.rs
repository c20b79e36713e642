use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;
use validator::Validate;

use crate::{
    config::AppConfig,
    middleware::{
        auth::AUTH_COOKIE,
        error_handling::{AppError, Result},
        Claims, JwtService,
    },
    models::user::{LoginRequest, UserResponse},
    repositories::UserRepository,
    services::{AuthService, TokenBlacklistService},
};

/// httpOnly so scripts in the browser never see the token.
fn create_auth_cookie(token: String, hours: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, token))
        .path("/")
        .max_age(Duration::hours(hours))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .build()
}

fn create_logout_cookie() -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, ""))
        .path("/")
        .max_age(Duration::ZERO)
        .http_only(true)
        .build()
}

fn with_cookie(mut response: Response, cookie: Cookie<'static>) -> Result<Response> {
    let value = HeaderValue::from_str(&cookie.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid cookie header: {}", e)))?;
    response.headers_mut().insert(header::SET_COOKIE, value);
    Ok(response)
}

pub(crate) fn auth_service(config: &AppConfig) -> AuthService {
    AuthService::new(
        UserRepository::new(config.database_pool.clone()),
        &config.jwt_secret,
    )
}

pub async fn login(
    State(config): State<AppConfig>,
    Json(request): Json<LoginRequest>,
) -> Result<Response> {
    request.validate().map_err(AppError::Validation)?;

    let (user, token) = auth_service(&config).login(request).await?;
    let cookie = create_auth_cookie(
        token.clone(),
        JwtService::session_hours(user.role),
        config.secure_cookies,
    );

    // token in the body too, for handheld scanners that cannot keep cookies
    let body = serde_json::json!({
        "user": user,
        "token": token,
    });
    with_cookie(Json(body).into_response(), cookie)
}

pub async fn logout(
    State(config): State<AppConfig>,
    Extension(claims): Extension<Claims>,
    Extension(blacklist): Extension<Arc<TokenBlacklistService>>,
) -> Result<Response> {
    auth_service(&config).logout(&claims, &blacklist);
    tracing::info!("User {} logged out", claims.user_id);
    with_cookie(StatusCode::NO_CONTENT.into_response(), create_logout_cookie())
}

pub async fn get_profile(
    State(config): State<AppConfig>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserResponse>> {
    let user = auth_service(&config).profile(claims.user_id).await?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_cookie_flags() {
        let cookie = create_auth_cookie("abc".to_string(), 12, true).to_string();
        assert!(cookie.starts_with("auth_token=abc"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=43200"));
    }

    #[test]
    fn test_logout_cookie_expires() {
        let cookie = create_logout_cookie().to_string();
        assert!(cookie.starts_with("auth_token="));
        assert!(cookie.contains("Max-Age=0"));
    }
}
