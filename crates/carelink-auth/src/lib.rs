//! # carelink-auth
//!
//! Identity service for Carelink: verifies HMAC-signed JWTs carrying `sub`,
//! `role`, and `exp` claims and turns them into a [`Principal`]. Also issues
//! tokens for local tooling and tests.
//!
//! [`Principal`]: carelink_core::Principal

#![deny(unsafe_code)]

pub mod errors;
pub mod jwt;

pub use errors::AuthError;
pub use jwt::{Claims, JwtIdentityService, parse_algorithm};
