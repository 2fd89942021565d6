//! User repository. Users are created on first login and never updated.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Role, User};

pub struct UserRepository;

impl UserRepository {
    /// Find a user by email, creating it when absent. The no-op DO UPDATE
    /// makes RETURNING yield the existing row on conflict; an existing
    /// user's role is never changed.
    pub async fn find_or_create(pool: &PgPool, email: &str, role: Role) -> Result<User, sqlx::Error> {
        let row: UserRow = sqlx::query_as(
            r#"INSERT INTO users (user_id, email, role)
               VALUES ($1, $2, $3)
               ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
               RETURNING user_id, email, role, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(role.as_str())
        .fetch_one(pool)
        .await?;

        Ok(row.into())
    }
}

/// Internal row type for sqlx
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    user_id: Uuid,
    email: String,
    role: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            user_id: row.user_id,
            email: row.email,
            role: Role::parse(&row.role),
            created_at: row.created_at,
        }
    }
}
