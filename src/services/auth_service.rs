use chrono::{TimeZone, Utc};
use uuid::Uuid;

use crate::config::BootstrapAdmin;
use crate::middleware::error_handling::{AppError, Result};
use crate::middleware::metrics::record_auth_failure;
use crate::middleware::{Claims, JwtService};
use crate::models::user::{CreateUserRequest, LoginRequest, UserResponse, UserRole};
use crate::repositories::UserRepository;
use crate::services::token_blacklist_service::TokenBlacklistService;
use crate::utils::log_sanitizer::sanitize_for_log;

/// Hash verified when the email is unknown, so both paths cost one bcrypt check.
const TIMING_DUMMY_HASH: &str = "$2b$12$C6UzMDM.H6dfI/f/IKcEeO5Q8pTl1Sx3hV0pO.6rR1a5cN4dC3Iy2";

pub struct AuthService {
    user_repo: UserRepository,
    jwt_service: JwtService,
}

impl AuthService {
    pub fn new(user_repo: UserRepository, jwt_secret: &str) -> Self {
        Self {
            user_repo,
            jwt_service: JwtService::new(jwt_secret),
        }
    }

    pub async fn login(&self, request: LoginRequest) -> Result<(UserResponse, String)> {
        let Some(user) = self.user_repo.find_by_email(&request.email).await? else {
            let _ = bcrypt::verify(&request.password, TIMING_DUMMY_HASH);
            record_auth_failure("unknown_email");
            tracing::info!("Login failed for unknown email {}", sanitize_for_log(&request.email));
            return Err(AppError::Unauthorized);
        };

        if !bcrypt::verify(&request.password, &user.password_hash)? {
            record_auth_failure("invalid_password");
            return Err(AppError::Unauthorized);
        }

        if !user.is_active {
            record_auth_failure("inactive_user");
            return Err(AppError::Forbidden("Account is disabled".to_string()));
        }

        let token = self
            .jwt_service
            .generate_token(user.id, &user.email, &user.full_name, user.role)?;
        self.user_repo.touch_last_login(user.id).await?;

        tracing::info!("User {} logged in as {}", user.id, user.role.as_str());
        Ok((user.into(), token))
    }

    pub fn logout(&self, claims: &Claims, blacklist: &TokenBlacklistService) {
        let expires_at = Utc
            .timestamp_opt(claims.exp as i64, 0)
            .single()
            .unwrap_or_else(|| Utc::now() + chrono::Duration::hours(24));
        blacklist.blacklist_token(&claims.jti, claims.user_id, expires_at, "logout");
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<UserResponse> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        Ok(user.into())
    }

    pub async fn create_user(&self, request: CreateUserRequest) -> Result<UserResponse> {
        if self.user_repo.find_by_email(&request.email).await?.is_some() {
            return Err(AppError::Conflict("A user with this email already exists".to_string()));
        }

        let password_hash = bcrypt::hash(&request.password, bcrypt::DEFAULT_COST)?;
        let user = self
            .user_repo
            .create(&request.email, &password_hash, &request.full_name, request.role)
            .await?;

        tracing::info!(
            "User created: {} ({})",
            sanitize_for_log(&user.email),
            user.role.as_str()
        );
        Ok(user.into())
    }

    pub async fn list_users(&self) -> Result<Vec<UserResponse>> {
        Ok(self
            .user_repo
            .list()
            .await?
            .into_iter()
            .map(UserResponse::from)
            .collect())
    }

    pub async fn set_active(&self, acting: &Claims, user_id: Uuid, is_active: bool) -> Result<UserResponse> {
        if acting.user_id == user_id && !is_active {
            return Err(AppError::BadRequest("You cannot deactivate your own account".to_string()));
        }
        let user = self
            .user_repo
            .set_active(user_id, is_active)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        tracing::info!("User {} active={} (by {})", user.id, is_active, acting.user_id);
        Ok(user.into())
    }

    /// Creates the first admin when the users table is empty.
    pub async fn ensure_bootstrap_admin(&self, bootstrap: &BootstrapAdmin) -> Result<bool> {
        if self.user_repo.count().await? > 0 {
            return Ok(false);
        }

        let password_hash = bcrypt::hash(&bootstrap.password, bcrypt::DEFAULT_COST)?;
        self.user_repo
            .create(&bootstrap.email, &password_hash, "Administrator", UserRole::Admin)
            .await?;

        tracing::info!("Bootstrap admin created: {}", sanitize_for_log(&bootstrap.email));
        Ok(true)
    }
}
