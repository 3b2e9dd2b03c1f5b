//! Authentication: JWT bearer tokens, password hashing, request middleware

pub mod middleware;
pub mod password;
pub mod tokens;

pub use middleware::{require_auth, AuthUser, TOKEN_COOKIE};
pub use password::PasswordHasher;
pub use tokens::TokenProvider;
