use sqlx::{postgres::PgRow, query, PgPool, Row};
use uuid::Uuid;

use crate::middleware::error_handling::Result;
use crate::models::user::{User, UserRole};

const USER_COLUMNS: &str =
    "id, email, password_hash, full_name, role, is_active, last_login_at, created_at, updated_at";

pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        email: &str,
        password_hash: &str,
        full_name: &str,
        role: UserRole,
    ) -> Result<User> {
        let row = query(&format!(
            r#"
            INSERT INTO users (email, password_hash, full_name, role)
            VALUES (LOWER($1), $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email.trim())
        .bind(password_hash)
        .bind(full_name.trim())
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(map_user(&row)?)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = LOWER($1)"
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_user).transpose()?)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(map_user).transpose()?)
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        let rows = query(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY full_name, email"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_user).collect::<std::result::Result<Vec<User>, sqlx::Error>>()?)
    }

    pub async fn count(&self) -> Result<i64> {
        let row = query("SELECT COUNT(*) AS total FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    pub async fn set_active(&self, id: Uuid, is_active: bool) -> Result<Option<User>> {
        let row = query(&format!(
            r#"
            UPDATE users SET is_active = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_user).transpose()?)
    }

    pub async fn touch_last_login(&self, id: Uuid) -> Result<()> {
        query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn map_user(row: &PgRow) -> std::result::Result<User, sqlx::Error> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        full_name: row.try_get("full_name")?,
        role: role.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        is_active: row.try_get("is_active")?,
        last_login_at: row.try_get("last_login_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
