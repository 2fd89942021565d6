use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;
use validator::ValidateEmail;

use crate::config::AuthConfig;
use crate::models::{Role, User};
use crate::store::UserRepository;

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user_id as string
    pub email: String,
    pub role: String,
    pub exp: usize, // Expiration time (as UTC timestamp)
    pub iat: usize, // Issued at
}

impl Claims {
    pub fn user_id(&self) -> Option<Uuid> {
        self.sub.parse().ok()
    }

    pub fn role(&self) -> Role {
        Role::parse(&self.role)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email")]
    InvalidEmail,
    #[error("Admin access is restricted")]
    AdminMismatch,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub user: User,
}

pub struct AuthService {
    db: PgPool,
    jwt_secret: String,
    admin_email: String,
    token_ttl_hours: i64,
}

impl AuthService {
    pub fn new(db: PgPool, cfg: &AuthConfig) -> Self {
        Self {
            db,
            jwt_secret: cfg.jwt_secret.clone(),
            admin_email: cfg.admin_email.clone(),
            token_ttl_hours: cfg.token_ttl_hours,
        }
    }

    /// Passwordless login: the user is created on first sight of the email.
    /// The configured admin email gets the admin role; when the caller asks
    /// for admin explicitly with any other email, the login is refused.
    pub async fn login(
        &self,
        email: &str,
        requested_admin: bool,
    ) -> Result<LoginOutcome, AuthError> {
        let email = email.trim().to_lowercase();
        if !email.validate_email() {
            return Err(AuthError::InvalidEmail);
        }

        let role = if email == self.admin_email {
            Role::Admin
        } else {
            Role::User
        };
        if requested_admin && role != Role::Admin {
            return Err(AuthError::AdminMismatch);
        }

        let user = UserRepository::find_or_create(&self.db, &email, role).await?;
        let token = self.issue_token(&user)?;

        tracing::info!(user_id = %user.user_id, role = user.role.as_str(), "login");
        Ok(LoginOutcome { token, user })
    }

    fn issue_token(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(Duration::hours(self.token_ttl_hours))
            .unwrap_or(now)
            .timestamp();

        let claims = Claims {
            sub: user.user_id.to_string(),
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            exp: expiration as usize,
            iat: now.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|_| AuthError::InvalidToken)
    }

    /// Verify JWT token
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let decoding_key = DecodingKey::from_secret(self.jwt_secret.as_bytes());
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_rejects_garbage() {
        assert!(!"not-an-email".validate_email());
        assert!("shopper@example.com".validate_email());
    }

    #[test]
    fn claims_parse_back() {
        let id = Uuid::new_v4();
        let claims = Claims {
            sub: id.to_string(),
            email: "shopper@example.com".into(),
            role: "user".into(),
            exp: 0,
            iat: 0,
        };
        assert_eq!(claims.user_id(), Some(id));
        assert_eq!(claims.role(), Role::User);
    }
}
