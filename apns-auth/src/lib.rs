#![forbid(unsafe_code)]

//! Provider authentication for the APNs client.
//!
//! Token-based authentication signs every request with a short-lived ES256
//! JWT. This crate holds the key types, the JWT encoder/decoder, and the
//! cache that rotates tokens before they go stale.

pub mod cache;
pub mod jwt;
pub mod key;

pub use cache::{CachedToken, TokenCache, REFRESH_INTERVAL};
pub use jwt::{Claims, Header, Jwt};
pub use key::{SigningKey, VerificationKey};
