//! # HTTP Request Handlers
//!
//! Thin adapters between HTTP and the ceremony logic in `webauthn`. Each
//! handler pulls what it needs from the request and session, calls into
//! the ceremonies or repositories, and returns JSON.
//!
//! ## Submodules
//! - `health`: Liveness and database ping
//! - `accounts`: Account bootstrap and profile
//! - `auth`: Registration and authentication ceremonies, logout, session info
//! - `credentials`: Listing and revoking the signed-in account's passkeys

pub mod accounts;
pub mod auth;
pub mod credentials;
pub mod health;
