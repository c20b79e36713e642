use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::user::UserRole;
use crate::services::token_blacklist_service::TokenBlacklistService;

pub const AUTH_COOKIE: &str = "auth_token";

/// Shift-length sessions for operators; admins re-authenticate sooner.
const SESSION_HOURS: i64 = 12;
const ADMIN_SESSION_HOURS: i64 = 2;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub exp: usize,
    pub iat: usize,
    pub jti: String,
}

impl Claims {
    pub fn can_supervise(&self) -> bool {
        self.role.can_supervise()
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
        }
    }

    pub fn session_hours(role: UserRole) -> i64 {
        if role.is_admin() {
            ADMIN_SESSION_HOURS
        } else {
            SESSION_HOURS
        }
    }

    pub fn generate_token(
        &self,
        user_id: Uuid,
        email: &str,
        full_name: &str,
        role: UserRole,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();
        let exp = now + Self::session_hours(role) * 60 * 60;

        let claims = Claims {
            sub: user_id.to_string(),
            user_id,
            email: email.to_string(),
            full_name: full_name.to_string(),
            role,
            exp: exp as usize,
            iat: now as usize,
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
    }

    pub fn extract_token_from_header(auth_header: &str) -> Option<&str> {
        auth_header.strip_prefix("Bearer ")
    }
}

/// Cookie first, `Authorization: Bearer` as fallback for scanners and scripts.
pub fn token_from_request(request: &Request) -> Option<String> {
    let cookie_jar = CookieJar::from_headers(request.headers());
    if let Some(cookie) = cookie_jar.get(AUTH_COOKIE) {
        return Some(cookie.value().to_string());
    }
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(JwtService::extract_token_from_header)
        .map(str::to_string)
}

pub async fn auth_middleware(
    State(config): State<AppConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let jwt_service = JwtService::new(&config.jwt_secret);

    let blacklist = request
        .extensions()
        .get::<Arc<TokenBlacklistService>>()
        .cloned();

    let token = token_from_request(&request).ok_or(StatusCode::UNAUTHORIZED)?;
    let claims = jwt_service
        .validate_token(&token)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    if let Some(blacklist) = blacklist {
        if blacklist.is_blacklisted(&claims.jti) {
            tracing::warn!("Blocked revoked token for user {}", claims.user_id);
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
