//! Authentication module for the North Star server
//!
//! Password and magic-link sign-in, JWT-backed sessions, the request
//! extractor for signed-in users, and rate limiting of sign-in attempts.

pub mod extractor;
pub mod handlers;
pub mod password;
mod rate_limit;
mod service;
pub mod tokens;

pub use extractor::AuthenticatedUser;
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use service::{normalize_email, AuthService};
pub use tokens::Claims;
