//! Local token issuance for Latchkey.
//!
//! Builds compact RS256 or ES256 tokens from an in-process claim set and a
//! PEM private key, typically one resolved through `latchkey-secrets`.

pub mod der;
pub mod jwt;
mod keys;

pub use der::der_to_jose;
pub use jwt::{JwtAlgorithm, LocalJwtOptions, TokenError, create_token, create_token_at};
