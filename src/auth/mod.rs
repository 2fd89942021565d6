//! Token-based authentication: passwordless email login, JWT issue/verify,
//! and the axum middleware that guards user and admin routes.

pub mod middleware;
pub mod service;

pub use middleware::{AuthUser, jwt_auth_middleware, require_admin};
pub use service::{AuthService, Claims, LoginOutcome};
