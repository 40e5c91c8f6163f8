//! # Middleware Module
//!
//! Request interceptors that run before route handlers.
//!
//! - `auth`: Rejects requests without a signed-in session, and names the
//!   session keys the ceremonies use

pub mod auth;
