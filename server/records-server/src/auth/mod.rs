//! Authentication: argon2id password hashing and HS256 access/refresh tokens
//!
//! Request-time identity resolution lives in
//! [`middleware::auth_context`](crate::middleware::auth_context).

pub mod jwt;
pub mod password;

pub use jwt::{IssuedToken, RefreshedToken, TokenClaims, TokenService, TokenUse};
